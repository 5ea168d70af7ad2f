//! Static in-memory directory for development and tests.

use super::{DirectoryError, DirectoryLookup, DirectorySession};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// A directory user.
#[derive(Clone)]
pub struct StaticUser {
    pub password: String,
    pub name: String,
    pub groups: HashSet<String>,
}

impl std::fmt::Debug for StaticUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticUser")
            .field("name", &self.name)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

/// Fixed user table, optionally accepting unknown users.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: Arc<HashMap<String, StaticUser>>,
    fallback: Option<Arc<StaticUser>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept any username not in the table with any non-empty password,
    /// resolving it to `name` and `groups`.
    pub fn accept_any<I, S>(mut self, name: &str, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback = Some(Arc::new(StaticUser {
            password: String::new(),
            name: name.to_string(),
            groups: groups.into_iter().map(|g| g.into().to_uppercase()).collect(),
        }));
        self
    }

    /// Development directory: every login succeeds as `mock` in group `MOCK`.
    pub fn development() -> Self {
        Self::new().accept_any("mock", ["MOCK"])
    }

    pub fn with_user<I, S>(mut self, username: &str, password: &str, name: &str, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let user = StaticUser {
            password: password.to_string(),
            name: name.to_string(),
            groups: groups.into_iter().map(|g| g.into().to_uppercase()).collect(),
        };
        Arc::make_mut(&mut self.users).insert(username.to_string(), user);
        self
    }
}

#[async_trait]
impl DirectoryLookup for StaticDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        Ok(Box::new(StaticSession {
            users: Arc::clone(&self.users),
            fallback: self.fallback.clone(),
            bound: None,
        }))
    }

    async fn health(&self) -> Result<(), DirectoryError> {
        Ok(())
    }
}

struct StaticSession {
    users: Arc<HashMap<String, StaticUser>>,
    fallback: Option<Arc<StaticUser>>,
    bound: Option<String>,
}

impl StaticSession {
    fn user(&self, username: &str) -> Option<&StaticUser> {
        self.users.get(username).or(self.fallback.as_deref())
    }
}

#[async_trait]
impl DirectorySession for StaticSession {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<String, DirectoryError> {
        self.bound = None;

        if password.is_empty() {
            return Err(DirectoryError::InvalidCredentials);
        }

        let name = match self.users.get(username) {
            Some(user) if bool::from(user.password.as_bytes().ct_eq(password.as_bytes())) => {
                user.name.clone()
            }
            Some(_) => return Err(DirectoryError::InvalidCredentials),
            None => match self.fallback {
                Some(ref fallback) => fallback.name.clone(),
                None => return Err(DirectoryError::InvalidCredentials),
            },
        };

        self.bound = Some(username.to_string());
        Ok(name)
    }

    async fn groups(&mut self, username: &str) -> Result<HashSet<String>, DirectoryError> {
        if self.bound.as_deref() != Some(username) {
            return Err(DirectoryError::NotBound);
        }

        self.user(username)
            .map(|user| user.groups.clone())
            .ok_or_else(|| DirectoryError::Lookup(format!("no entry for {username}")))
    }

    async fn close(self: Box<Self>) {}
}
