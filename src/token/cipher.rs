//! AES-256-GCM envelope for issued tokens.
//!
//! Sealed tokens are `base64url(nonce || ciphertext)` with a random 96-bit
//! nonce per token.

use super::codec::CodecError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

const NONCE_LEN: usize = 12;

/// Symmetric cipher wrapping compact JWTs.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, CodecError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CodecError::Encoding(format!("encryption failed: {e}")))?;

        let mut sealed = nonce_bytes.to_vec();
        sealed.extend(ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Every failure collapses into [`CodecError::Invalid`].
    pub fn open(&self, sealed: &str) -> Result<String, CodecError> {
        let data = URL_SAFE_NO_PAD
            .decode(sealed)
            .map_err(|_| CodecError::Invalid)?;
        if data.len() <= NONCE_LEN {
            return Err(CodecError::Invalid);
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CodecError::Invalid)?;

        String::from_utf8(plaintext).map_err(|_| CodecError::Invalid)
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}
