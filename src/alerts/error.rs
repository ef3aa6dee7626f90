use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("notifier misconfigured: {0}")]
    Configuration(String),
}
