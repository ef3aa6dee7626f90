use thiserror::Error;

use crate::domain::Algorithm;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AlgorithmError {
    #[error("identifier must not be empty")]
    EmptyIdentifier,

    #[error("no strategy registered for algorithm {0:?}")]
    Unregistered(Algorithm),

    #[error(transparent)]
    Store(#[from] StoreError),
}
