use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("script execution failed: {0}")]
    Script(String),

    #[error("backend error: {0}")]
    Backend(String),
}
