//! In-memory store implementations.
//!
//! Suitable for tests and single-process development. Data is not
//! persisted and expired sessions are dropped lazily on access.

use super::{SecretInsert, SecretStore, ServiceSecret, SessionKey, SessionStore, StoreError};
use crate::token::TokenClaims;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-memory secret registry.
#[derive(Debug, Default, Clone)]
pub struct MemorySecretStore {
    secrets: Arc<RwLock<HashMap<String, ServiceSecret>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a secret, replacing any existing one.
    pub fn with_secret(self, service: impl Into<String>, secret: ServiceSecret) -> Self {
        self.secrets.write().insert(service.into(), secret);
        self
    }

    pub fn len(&self) -> usize {
        self.secrets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.read().is_empty()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn find(&self, service: &str) -> Result<Option<ServiceSecret>, StoreError> {
        Ok(self.secrets.read().get(service).cloned())
    }

    async fn create_if_absent(
        &self,
        service: &str,
        secret: &ServiceSecret,
    ) -> Result<SecretInsert, StoreError> {
        let mut secrets = self.secrets.write();
        if let Some(existing) = secrets.get(service) {
            return Ok(SecretInsert::Existing(existing.clone()));
        }
        secrets.insert(service.to_string(), secret.clone());
        Ok(SecretInsert::Created)
    }

    async fn delete(&self, service: &str) -> Result<Option<ServiceSecret>, StoreError> {
        Ok(self.secrets.write().remove(service))
    }

    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct SessionEntry {
    claims: TokenClaims,
    expires_at: Instant,
}

/// In-memory session store with per-entry expiry.
#[derive(Default, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionKey, SessionEntry>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expiry instant of a live session.
    pub fn expires_at(&self, key: &SessionKey) -> Option<Instant> {
        self.sessions
            .read()
            .get(key)
            .map(|entry| entry.expires_at)
            .filter(|at| *at > Instant::now())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .read()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore")
            .field("sessions", &self.sessions.read().len())
            .finish()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<TokenClaims>, StoreError> {
        let now = Instant::now();
        {
            let sessions = self.sessions.read();
            match sessions.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.claims.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }

        // Expired: evict
        self.sessions.write().retain(|_, entry| entry.expires_at > now);
        Ok(None)
    }

    async fn put(&self, key: &SessionKey, claims: &TokenClaims, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Backend(format!("invalid session ttl {ttl:?}")))?;

        self.sessions.write().insert(
            key.clone(),
            SessionEntry {
                claims: claims.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
