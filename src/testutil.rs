//! Fault-injecting collaborator fakes for tests.
//!
//! Each fake wraps an in-memory adapter and can be switched into a failure
//! mode per test; nothing is shared between tests.

use crate::directory::{DirectoryError, DirectoryLookup, DirectorySession, StaticDirectory};
use crate::service::Collaborators;
use crate::store::{
    MemorySecretStore, MemorySessionStore, SecretInsert, SecretStore, ServiceSecret, SessionKey,
    SessionStore, StoreError,
};
use crate::token::{JwtCodec, TokenClaims};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Where a [`FaultyDirectory`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryFault {
    Connect,
    Authenticate,
    /// Bind rejected with a non-credential result, e.g. a locked account
    Refuse,
    /// Bind never completes
    HangBind,
    Groups,
    /// Group lookup never completes
    Hang,
    Health,
}

/// Directory wrapper counting opened and closed sessions.
#[derive(Debug, Clone)]
pub struct FaultyDirectory {
    inner: StaticDirectory,
    fault: Option<DirectoryFault>,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl FaultyDirectory {
    pub fn new(inner: StaticDirectory) -> Self {
        Self {
            inner,
            fault: None,
            connects: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(mut self, fault: DirectoryFault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryLookup for FaultyDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        if self.fault == Some(DirectoryFault::Connect) {
            return Err(DirectoryError::Unavailable("connection refused".to_string()));
        }

        let inner = self.inner.connect().await?;
        self.connects.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FaultySession {
            inner,
            fault: self.fault,
            closes: Arc::clone(&self.closes),
        }))
    }

    async fn health(&self) -> Result<(), DirectoryError> {
        match self.fault {
            Some(DirectoryFault::Health) | Some(DirectoryFault::Connect) => {
                Err(DirectoryError::Unavailable("connection refused".to_string()))
            }
            _ => self.inner.health().await,
        }
    }
}

struct FaultySession {
    inner: Box<dyn DirectorySession>,
    fault: Option<DirectoryFault>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl DirectorySession for FaultySession {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<String, DirectoryError> {
        match self.fault {
            Some(DirectoryFault::Authenticate) => Err(DirectoryError::InvalidCredentials),
            Some(DirectoryFault::Refuse) => {
                Err(DirectoryError::Lookup("unwillingToPerform".to_string()))
            }
            Some(DirectoryFault::HangBind) => std::future::pending().await,
            _ => self.inner.authenticate(username, password).await,
        }
    }

    async fn groups(&mut self, username: &str) -> Result<HashSet<String>, DirectoryError> {
        match self.fault {
            Some(DirectoryFault::Groups) => Err(DirectoryError::Lookup("no such object".to_string())),
            Some(DirectoryFault::Hang) => std::future::pending().await,
            _ => self.inner.groups(username).await,
        }
    }

    async fn close(self: Box<Self>) {
        let session = *self;
        session.closes.fetch_add(1, Ordering::SeqCst);
        session.inner.close().await;
    }
}

/// Secret store that can be taken offline.
#[derive(Debug, Clone, Default)]
pub struct FaultySecretStore {
    inner: MemorySecretStore,
    unavailable: Arc<AtomicBool>,
}

impl FaultySecretStore {
    pub fn new(inner: MemorySecretStore) -> Self {
        Self {
            inner,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for FaultySecretStore {
    async fn find(&self, service: &str) -> Result<Option<ServiceSecret>, StoreError> {
        self.check()?;
        self.inner.find(service).await
    }

    async fn create_if_absent(&self, service: &str, secret: &ServiceSecret) -> Result<SecretInsert, StoreError> {
        self.check()?;
        self.inner.create_if_absent(service, secret).await
    }

    async fn delete(&self, service: &str) -> Result<Option<ServiceSecret>, StoreError> {
        self.check()?;
        self.inner.delete(service).await
    }

    async fn health(&self) -> Result<(), StoreError> {
        self.check()?;
        self.inner.health().await
    }
}

/// Session store with independently failing reads and writes.
#[derive(Debug, Clone, Default)]
pub struct FaultySessionStore {
    inner: MemorySessionStore,
    fail_get: Arc<AtomicBool>,
    fail_put: Arc<AtomicBool>,
}

impl FaultySessionStore {
    pub fn new(inner: MemorySessionStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn inner(&self) -> &MemorySessionStore {
        &self.inner
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for FaultySessionStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<TokenClaims>, StoreError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &SessionKey, claims: &TokenClaims, ttl: Duration) -> Result<(), StoreError> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("READONLY replica".to_string()));
        }
        self.inner.put(key, claims, ttl).await
    }

    async fn health(&self) -> Result<(), StoreError> {
        self.inner.health().await
    }
}

/// Registered service used by [`Fixture`].
pub const SERVICE: &str = "billing";
pub const USERNAME: &str = "jdoe";
pub const PASSWORD: &str = "correct-horse";

/// A full set of fakes with one user and one registered service.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub directory: FaultyDirectory,
    pub secrets: FaultySecretStore,
    pub sessions: FaultySessionStore,
    pub codec: JwtCodec,
}

impl Fixture {
    pub fn new() -> Self {
        let directory = StaticDirectory::new()
            .with_user(USERNAME, PASSWORD, "John Doe", ["admins", "users"])
            .with_user("asmith", "hunter2", "Alice Smith", ["users"]);
        let secrets = MemorySecretStore::new().with_secret(SERVICE, ServiceSecret::generate());

        Self {
            directory: FaultyDirectory::new(directory),
            secrets: FaultySecretStore::new(secrets),
            sessions: FaultySessionStore::new(MemorySessionStore::new()),
            codec: JwtCodec::new(),
        }
    }

    pub fn with_directory_fault(mut self, fault: DirectoryFault) -> Self {
        self.directory = self.directory.failing(fault);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            directory: Arc::new(self.directory.clone()),
            secrets: Arc::new(self.secrets.clone()),
            sessions: Arc::new(self.sessions.clone()),
            codec: Arc::new(self.codec.clone()),
        }
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
