//! The shortener facade and its background deletion worker.
//!
//! [`ShortenerService`] composes a storage backend, a
//! [`SessionCodec`](stubby_session::SessionCodec) and a [`DeletionQueue`]
//! into the operations the HTTP boundary consumes through the object-safe
//! [`Shortener`] trait.
//!
//! # Deletion is best-effort
//!
//! [`Shortener::delete_urls`] only posts a request to the queue and returns.
//! A single [`DeletionDaemon`] drains the queue on a fixed interval and applies
//! up to `max_batch_size` requests in one bulk update. When that update fails
//! the batch is logged and dropped: there is no retry, no dead-letter store and
//! no acknowledgement to the caller. Requests still queued when the daemon is
//! cancelled, or sent after it stopped, are discarded.

pub mod config;
pub mod daemon;
pub mod error;
pub mod service;
pub mod shortener;

pub use config::{DeletionConfig, ShortenerConfig};
pub use daemon::{DaemonState, DeletionDaemon, DeletionQueue};
pub use error::{Result, ShortenerError};
pub use service::ShortenerService;
pub use shortener::{Identity, Shortened, Shortener, UserUrl};
