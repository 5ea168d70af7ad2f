//! Shared setup for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use credential_broker::api::{self, AppState};
use credential_broker::directory::{DirectoryError, DirectoryLookup, DirectorySession, StaticDirectory};
use credential_broker::service::Collaborators;
use credential_broker::store::{MemorySecretStore, MemorySessionStore, ServiceSecret};
use credential_broker::token::JwtCodec;
use credential_broker::Config;
use std::sync::Arc;
use std::time::Duration;

pub const SERVICE: &str = "billing";
pub const USERNAME: &str = "jdoe";
pub const PASSWORD: &str = "correct-horse";

/// Directory whose every call reports the server as down.
pub struct DownDirectory;

#[async_trait]
impl DirectoryLookup for DownDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".to_string()))
    }

    async fn health(&self) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".to_string()))
    }
}

pub struct TestApp {
    pub router: axum::Router,
    pub secrets: MemorySecretStore,
    pub sessions: MemorySessionStore,
}

pub fn config(debug: bool) -> Config {
    Config {
        debug,
        collaborator_timeout: Duration::from_millis(500),
        ..Config::default()
    }
}

pub fn directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_user(USERNAME, PASSWORD, "John Doe", ["admins", "users"])
        .with_user("asmith", "hunter2", "Alice Smith", ["users"])
}

pub fn app_with(directory: Arc<dyn DirectoryLookup>, debug: bool) -> TestApp {
    app_with_config(directory, &config(debug))
}

pub fn app_with_config(directory: Arc<dyn DirectoryLookup>, config: &Config) -> TestApp {
    let secrets = MemorySecretStore::new().with_secret(SERVICE, ServiceSecret::generate());
    let sessions = MemorySessionStore::new();

    let collaborators = Collaborators {
        directory,
        secrets: Arc::new(secrets.clone()),
        sessions: Arc::new(sessions.clone()),
        codec: Arc::new(JwtCodec::new()),
    };
    let state = Arc::new(AppState::new(collaborators, config));

    TestApp {
        router: api::router(state),
        secrets,
        sessions,
    }
}

pub fn app() -> TestApp {
    app_with(Arc::new(directory()), false)
}
