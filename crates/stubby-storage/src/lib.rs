pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
pub use stubby_core::repository::{LinkRepository, Repository, Result, UserLinkRepository};
pub use stubby_core::StorageError;

/// Upper bound on short-id candidates tried for one new link.
///
/// Derived ids are only a hint (`row_count + 1`); the unique constraint on
/// `short_id` is what actually arbitrates.
pub const MAX_CREATE_ATTEMPTS: i64 = 5;
