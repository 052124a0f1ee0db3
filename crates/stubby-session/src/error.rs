use thiserror::Error;

/// Errors raised while building the codec or sealing a token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session key must be at least {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },
    #[error("session token encryption failed")]
    Encryption,
}

/// Errors raised while opening a token.
///
/// Callers must handle both variants the same way so that clients cannot
/// tell a garbled token from a forged one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed session token: {0}")]
    Malformed(String),
    #[error("session token failed authentication")]
    Invalid,
}
