use std::fmt;

/// Flat error type for the few call sites that need one (config loading,
/// startup wiring). Per-module errors (`StoreError`, `RepositoryError`,
/// `NotifierError`, `ResolveError`) stay narrow; this type exists only at
/// the composition root, not on the verdict path — a check request never
/// surfaces one of these, it always gets a documented verdict/reason (see
/// `RateLimitResult`).
#[derive(Debug)]
#[allow(dead_code)]
pub enum RateLimitError {
    Config(String),
    Storage(String),
    Repository(String),
    Internal(String),
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::Config(msg) => write!(f, "config error: {}", msg),
            RateLimitError::Storage(msg) => write!(f, "storage error: {}", msg),
            RateLimitError::Repository(msg) => write!(f, "repository error: {}", msg),
            RateLimitError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for RateLimitError {}
