//! HTTP boundary of the Stubby URL shortener.
//!
//! A thin axum router over an `Arc<dyn Shortener>`. Every request passes
//! through the session middleware, which resolves the `session` cookie into a
//! [`UserId`](stubby_core::UserId) request extension.

pub mod app;
pub mod error;
pub mod handlers;
pub mod model;
pub mod session;
pub mod state;

pub use app::App;
pub use state::AppState;
