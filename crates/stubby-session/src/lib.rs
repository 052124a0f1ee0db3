//! Stateless session tokens for anonymous users.
//!
//! A [`SessionCodec`] seals a [`UserId`](stubby_core::UserId) with AES-GCM
//! under a process-wide key and returns it as an opaque base64
//! string suitable for a cookie. Nothing is stored server side: rotating the
//! key invalidates every outstanding token.

mod codec;
pub mod error;

pub use codec::{SessionCodec, KEY_SIZE, NONCE_SIZE};
pub use error::{AuthError, SessionError};
