use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use stubby_core::{ShortId, UserId};

/// Result of shortening a single URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub short_url: String,
    /// The URL was already stored; `short_url` is the existing one.
    pub conflict: bool,
}

/// A resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    /// Set when a fresh identity was minted and the caller must hand this
    /// token back to the client.
    pub issued_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserUrl {
    pub short_url: String,
    pub original_url: String,
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Resolves a session token, minting a new identity when it is absent or
    /// does not decode.
    fn identify(&self, token: Option<&str>) -> Result<Identity>;

    /// Shortens a URL and, when `user_id` is given, records that the user
    /// owns the resulting link.
    async fn make_shorter(&self, original_url: &str, user_id: Option<&UserId>)
        -> Result<Shortened>;

    /// Shortens every URL in one atomic unit. Short URLs come back in input
    /// order. No ownership is recorded.
    async fn make_shorter_batch(&self, original_urls: &[String]) -> Result<Vec<String>>;

    /// Looks up the original URL behind a short id.
    async fn restore_long(&self, short_id: &ShortId) -> Result<String>;

    /// Every link the user created or resolved. Empty for an absent user.
    async fn get_user_links(&self, user_id: Option<&UserId>) -> Result<Vec<UserUrl>>;

    /// Queues soft deletion of the user's links and returns immediately.
    ///
    /// Returns whether the request was queued. Deletion is best-effort.
    fn delete_urls(&self, user_id: UserId, short_ids: Vec<ShortId>) -> bool;

    /// Bounded liveness probe of the storage backend. Never fails.
    async fn is_storage_available(&self) -> bool;
}
