//! Secret and session stores.
//!
//! The secret store maps a service name to its signing secret; the session
//! store maps a (username, service, token) key to the issued claims with a
//! time-to-live. Both own persistence and TTL enforcement.

pub mod memory;
pub mod redis;

pub use self::memory::{MemorySecretStore, MemorySessionStore};
pub use self::redis::{RedisSecretStore, RedisSessionStore, RedisStore};

use crate::token::TokenClaims;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

/// Store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store command failed: {0}")]
    Backend(String),

    #[error("stored value is corrupt: {0}")]
    Corrupt(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

/// Per-service signing secret.
///
/// The value is scrubbed from memory on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceSecret(Zeroizing<String>);

impl ServiceSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// 32 random bytes, base64url encoded.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        rand::thread_rng().fill_bytes(bytes.as_mut());
        Self::new(URL_SAFE_NO_PAD.encode(bytes.as_ref()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for ServiceSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServiceSecret(***)")
    }
}

/// Outcome of an atomic create-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretInsert {
    /// The secret was stored
    Created,
    /// A secret was already present and was left untouched
    Existing(ServiceSecret),
}

/// Session key: the (username, service, token) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub username: String,
    pub service: String,
    pub token: String,
}

impl SessionKey {
    pub fn new(
        username: impl Into<String>,
        service: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            service: service.into(),
            token: token.into(),
        }
    }

    /// Fixed-length digest of the triple.
    ///
    /// Each component is length-prefixed so distinct triples never collide
    /// through separator characters inside usernames or service names.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.username, &self.service, &self.token] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Service name to signing secret registry.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn find(&self, service: &str) -> Result<Option<ServiceSecret>, StoreError>;

    /// Store `secret` only if no secret exists for `service`.
    async fn create_if_absent(
        &self,
        service: &str,
        secret: &ServiceSecret,
    ) -> Result<SecretInsert, StoreError>;

    /// Remove the secret, returning it if one existed.
    async fn delete(&self, service: &str) -> Result<Option<ServiceSecret>, StoreError>;

    async fn health(&self) -> Result<(), StoreError>;
}

/// TTL-keyed store of issued-token state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &SessionKey) -> Result<Option<TokenClaims>, StoreError>;

    /// Write `claims` under `key`, replacing any previous value and TTL.
    async fn put(&self, key: &SessionKey, claims: &TokenClaims, ttl: Duration) -> Result<(), StoreError>;

    async fn health(&self) -> Result<(), StoreError>;
}
