use crate::error::{AuthError, SessionError};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Nonce};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use stubby_core::UserId;

/// Key length in bytes; AES-128 keys match the cipher block size.
pub const KEY_SIZE: usize = 16;
/// AES-GCM nonce length in bytes.
pub const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

type TokenNonce = Nonce<<Aes128Gcm as AeadCore>::NonceSize>;

/// Seals and opens session tokens.
///
/// Token layout before base64 (no padding): `ciphertext || tag || nonce`.
#[derive(Clone)]
pub struct SessionCodec {
    cipher: Aes128Gcm,
}

impl SessionCodec {
    /// Builds a codec from the first [`KEY_SIZE`] bytes of `secret`.
    pub fn new(secret: &[u8]) -> Result<Self, SessionError> {
        let key = secret.get(..KEY_SIZE).ok_or(SessionError::InvalidKey {
            expected: KEY_SIZE,
            actual: secret.len(),
        })?;

        let cipher = Aes128Gcm::new_from_slice(key).map_err(|_| SessionError::InvalidKey {
            expected: KEY_SIZE,
            actual: key.len(),
        })?;

        Ok(Self { cipher })
    }

    /// Seals `id` under a fresh random nonce.
    pub fn encode(&self, id: &UserId) -> Result<String, SessionError> {
        let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
        self.seal(id, &nonce)
    }

    /// Opens a token produced by [`encode`](Self::encode) with the same key.
    pub fn decode(&self, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Malformed("empty token".to_string()));
        }

        let raw = STANDARD_NO_PAD
            .decode(token)
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(AuthError::Malformed(format!(
                "token too short: {} bytes",
                raw.len()
            )));
        }

        let (sealed, nonce) = raw.split_at(raw.len() - NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| AuthError::Invalid)?;

        let plaintext = std::str::from_utf8(&plaintext).map_err(|_| AuthError::Invalid)?;
        plaintext.parse().map_err(|_| AuthError::Invalid)
    }

    fn seal(&self, id: &UserId, nonce: &TokenNonce) -> Result<String, SessionError> {
        let mut raw = self
            .cipher
            .encrypt(nonce, id.to_string().as_bytes())
            .map_err(|_| SessionError::Encryption)?;
        raw.extend_from_slice(nonce);

        Ok(STANDARD_NO_PAD.encode(raw))
    }
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec").finish_non_exhaustive()
    }
}
