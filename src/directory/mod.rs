//! Directory lookup: credential checks and group resolution.
//!
//! A [`DirectoryLookup`] hands out one [`DirectorySession`] per
//! authentication attempt. The session is bound to a single identity after a
//! successful [`DirectorySession::authenticate`] and must be released with
//! [`DirectorySession::close`].

pub mod ldap;
pub mod memory;

pub use self::ldap::LdapDirectory;
pub use self::memory::{StaticDirectory, StaticUser};

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Directory failures.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("directory lookup failed: {0}")]
    Lookup(String),

    /// Group lookup attempted without a successful bind for that user
    #[error("session is not bound to the requested identity")]
    NotBound,

    #[error("directory call timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of scoped directory sessions.
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    /// Open a new session.
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError>;

    async fn health(&self) -> Result<(), DirectoryError>;
}

/// A single connection scope.
#[async_trait]
pub trait DirectorySession: Send {
    /// Verify the credentials and bind the session to `username`.
    ///
    /// Returns the directory display name, which may be empty.
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<String, DirectoryError>;

    /// Upper-cased group names of the bound identity.
    async fn groups(&mut self, username: &str) -> Result<HashSet<String>, DirectoryError>;

    /// Release the connection. Never fails; errors are logged by the adapter.
    async fn close(self: Box<Self>);
}
