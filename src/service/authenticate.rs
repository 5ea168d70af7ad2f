//! Token issuance.

use super::{bounded, require, Collaborators};
use crate::config::Config;
use crate::directory::{DirectoryError, DirectorySession};
use crate::error::BrokerError;
use crate::groups::filter_groups;
use crate::metrics;
use crate::store::SessionKey;
use crate::token::TokenClaims;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Issues tokens for directory-authenticated users.
#[derive(Debug, Clone)]
pub struct Authenticator {
    collaborators: Collaborators,
    token_ttl: Duration,
    session_ttl: Duration,
    timeout: Duration,
}

impl Authenticator {
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        Self {
            collaborators,
            token_ttl: config.token_ttl,
            session_ttl: config.redis.session_ttl,
            timeout: config.collaborator_timeout,
        }
    }

    /// Authenticate `username` and issue a token scoped to `service`.
    ///
    /// The token carries the subset of `groups` the directory reports for
    /// the user, and is only returned once its session has been stored.
    ///
    /// # Errors
    ///
    /// - `Validation` when a field is empty, before any collaborator is called
    /// - `ServiceNotRegistered` when `service` has no secret; the directory is not contacted
    /// - `InvalidCredentials`, `AccessDenied` for rejected users
    /// - `DirectoryUnavailable`, `Directory`, `Store`, `Encoding` for collaborator failures
    #[instrument(skip(self, password, groups), fields(requested = groups.len()))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        service: &str,
        groups: &[String],
    ) -> Result<String, BrokerError> {
        let result = self.issue(username, password, service, groups).await;
        metrics::record_authentication(&result);

        match result {
            Ok(_) => info!("token issued"),
            Err(ref e) if e.is_internal() => warn!(error = %e, "authentication failed"),
            Err(ref e) => info!(code = e.code().as_str(), "authentication rejected"),
        }
        result
    }

    async fn issue(
        &self,
        username: &str,
        password: &str,
        service: &str,
        groups: &[String],
    ) -> Result<String, BrokerError> {
        require("username", username)?;
        require("password", password)?;
        require("service", service)?;
        if groups.iter().all(|g| g.trim().is_empty()) {
            return Err(BrokerError::validation("groups"));
        }

        let Collaborators {
            directory,
            secrets,
            sessions,
            codec,
        } = &self.collaborators;

        let secret = bounded("secret_store", self.timeout, secrets.find(service))
            .await?
            .ok_or_else(|| BrokerError::not_registered(service))?;

        let mut session = bounded("directory", self.timeout, directory.connect())
            .await
            .map_err(|e| BrokerError::DirectoryUnavailable {
                detail: e.to_string(),
            })?;

        let resolved = self
            .resolve(&mut session, username, password, groups)
            .await;

        if tokio::time::timeout(self.timeout, session.close()).await.is_err() {
            warn!("directory session close timed out");
        }
        let (display_name, granted) = resolved?;

        let claims = TokenClaims::new(
            username.to_string(),
            service.to_string(),
            granted,
            self.token_ttl,
        )
        .with_name(display_name);
        let token = codec.create_token(&claims, &secret)?;

        let key = SessionKey::new(username, service, token.as_str());
        bounded("session_store", self.timeout, sessions.put(&key, &claims, self.session_ttl)).await?;

        Ok(token)
    }

    /// Bind as the user and intersect the requested groups with theirs.
    async fn resolve(
        &self,
        session: &mut Box<dyn DirectorySession>,
        username: &str,
        password: &str,
        requested: &[String],
    ) -> Result<(String, Vec<String>), BrokerError> {
        let display_name = bounded("directory", self.timeout, session.authenticate(username, password))
            .await
            .map_err(|e| match e {
                DirectoryError::Unavailable(_) | DirectoryError::Timeout(_) => BrokerError::from(e),
                other => {
                    debug!(error = %other, "directory refused bind");
                    BrokerError::InvalidCredentials
                }
            })?;

        let available = bounded("directory", self.timeout, session.groups(username))
            .await
            .map_err(|e| BrokerError::Directory {
                detail: e.to_string(),
            })?;

        let granted = filter_groups(requested, &available);
        if granted.is_empty() {
            return Err(BrokerError::AccessDenied);
        }

        Ok((display_name, granted))
    }
}
