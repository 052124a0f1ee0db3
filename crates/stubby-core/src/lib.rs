//! Core types and traits for the Stubby URL shortener.
//!
//! This crate holds the data model shared by the storage backends and the
//! shortener service: links, ownership associations, the anonymous user
//! identity and the repository contracts both backends implement.

pub mod deletion;
pub mod error;
pub mod repository;
pub mod short_id;
pub mod user_id;

pub use deletion::DeleteRequest;
pub use error::{CoreError, StorageError};
pub use repository::{
    CreatedLink, Link, LinkRepository, Repository, UserLink, UserLinkRepository,
};
pub use short_id::ShortId;
pub use user_id::UserId;
