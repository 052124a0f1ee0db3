use crate::deletion::DeleteRequest;
use crate::error::StorageError;
use crate::short_id::ShortId;
use crate::user_id::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A stored long-to-short mapping.
///
/// `original_url` and `short_id` are each unique across all links. Links are
/// never physically removed; `is_deleted` only flips through a batched
/// [`UserLinkRepository::delete_links`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Storage-assigned row id.
    pub id: i64,
    pub short_id: ShortId,
    pub original_url: String,
    pub is_deleted: bool,
}

/// Outcome of [`LinkRepository::create_link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedLink {
    pub link: Link,
    /// `true` when the URL was already stored under a different short id
    /// than the one this call tried to insert. No new row was created.
    pub conflict: bool,
}

/// Ownership of a link by an anonymous user.
///
/// At most one association exists per `(user_id, link.id)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLink {
    pub id: i64,
    pub user_id: UserId,
    pub link: Link,
}

/// The canonical table of long-to-short mappings.
#[async_trait]
pub trait LinkRepository: Send + Sync + 'static {
    /// Inserts a mapping for `original_url`, or returns the existing one.
    ///
    /// When `short_id` is `None` the store derives the next counter id. A
    /// collision on the URL is not an error: the existing row comes back with
    /// `conflict` set. A collision on an explicit short id owned by another
    /// URL is `Err(StorageError::Conflict)`.
    async fn create_link(&self, short_id: Option<&ShortId>, original_url: &str)
        -> Result<CreatedLink>;

    /// Resolves or creates every URL in one atomic unit.
    ///
    /// The output mirrors the input order. URLs that already exist keep their
    /// short id. New rows get `row_count + 1 + position`.
    async fn create_batch(&self, original_urls: &[String]) -> Result<Vec<Link>>;

    /// Point lookup, including soft-deleted rows.
    async fn find_by_short_id(&self, short_id: &ShortId) -> Result<Option<Link>>;

    /// Cheap round-trip used as a liveness probe.
    async fn ping(&self) -> Result<()>;
}

/// Ownership associations and batched soft deletion.
#[async_trait]
pub trait UserLinkRepository: Send + Sync + 'static {
    /// Associates `user_id` with the link. Idempotent.
    async fn create_user_link(&self, user_id: &UserId, link_id: i64) -> Result<()>;

    async fn find_by_link_id(&self, user_id: &UserId, link_id: i64) -> Result<Option<UserLink>>;

    /// Every link owned by `user_id`, in store iteration order.
    async fn list_user_links(&self, user_id: &UserId) -> Result<Vec<UserLink>>;

    /// Flags as deleted every link whose short id is listed in a request and
    /// which that request's user owns, in a single bulk update.
    ///
    /// Returns the number of rows updated.
    async fn delete_links(&self, requests: &[DeleteRequest]) -> Result<u64>;
}

/// A backend providing both the link table and the ownership index.
pub trait Repository: LinkRepository + UserLinkRepository {}

impl<T: LinkRepository + UserLinkRepository> Repository for T {}
