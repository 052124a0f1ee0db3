use stubby_core::StorageError;
use stubby_session::SessionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("short id not found: {0}")]
    NotFound(String),
    /// The link exists but was soft-deleted. The URL is still carried so the
    /// caller can decide what to do with it.
    #[error("short id was deleted: {short_id}")]
    Gone {
        short_id: String,
        original_url: String,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
