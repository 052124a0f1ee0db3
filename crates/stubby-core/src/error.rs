use thiserror::Error;

/// Errors raised while constructing core values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid short id: {0}")]
    InvalidShortId(String),
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
}

/// Errors returned by storage backends.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short id already taken: {0}")]
    Conflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}
