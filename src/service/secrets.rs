//! Per-service secret lifecycle.
//!
//! Each registered service owns exactly one signing secret. Secrets are
//! never overwritten; replacing one requires an explicit delete first.

use super::{bounded, require};
use crate::error::BrokerError;
use crate::metrics;
use crate::store::{SecretInsert, SecretStore, ServiceSecret};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Result of [`SecretLifecycle::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// A new secret was generated and stored
    Created(ServiceSecret),
    /// The service was already registered; its secret is unchanged
    Existing(ServiceSecret),
}

/// Result of [`SecretLifecycle::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Deleted(ServiceSecret),
    NotFound,
}

/// Find, create and delete per-service secrets.
#[derive(Clone)]
pub struct SecretLifecycle {
    secrets: Arc<dyn SecretStore>,
    timeout: Duration,
}

impl std::fmt::Debug for SecretLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretLifecycle")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SecretLifecycle {
    pub fn new(secrets: Arc<dyn SecretStore>, timeout: Duration) -> Self {
        Self { secrets, timeout }
    }

    pub async fn find(&self, service: &str) -> Result<Option<ServiceSecret>, BrokerError> {
        require("service", service)?;
        Ok(bounded("secret_store", self.timeout, self.secrets.find(service)).await?)
    }

    /// Store `secret` for `service`.
    ///
    /// # Errors
    ///
    /// `SecretAlreadyExists` carrying the untouched existing secret when the
    /// service is already registered.
    #[instrument(skip(self, secret))]
    pub async fn create(&self, service: &str, secret: ServiceSecret) -> Result<(), BrokerError> {
        let result = self.insert(service, &secret).await;
        metrics::record_secret_operation("create", &result);
        result
    }

    async fn insert(&self, service: &str, secret: &ServiceSecret) -> Result<(), BrokerError> {
        require("service", service)?;
        if secret.is_empty() {
            return Err(BrokerError::validation("secret"));
        }

        match bounded("secret_store", self.timeout, self.secrets.create_if_absent(service, secret)).await? {
            SecretInsert::Created => {
                info!("service secret created");
                Ok(())
            }
            SecretInsert::Existing(existing) => Err(BrokerError::SecretAlreadyExists {
                service: service.to_string(),
                existing,
            }),
        }
    }

    /// Delete the secret for `service`, returning it.
    ///
    /// # Errors
    ///
    /// `SecretNotFound` when nothing is registered for the service.
    #[instrument(skip(self))]
    pub async fn delete(&self, service: &str) -> Result<ServiceSecret, BrokerError> {
        let result = self.take(service).await;
        metrics::record_secret_operation("delete", &result);
        result
    }

    async fn take(&self, service: &str) -> Result<ServiceSecret, BrokerError> {
        require("service", service)?;

        let removed = bounded("secret_store", self.timeout, self.secrets.delete(service))
            .await?
            .ok_or_else(|| BrokerError::SecretNotFound {
                service: service.to_string(),
            })?;

        info!("service secret deleted");
        Ok(removed)
    }

    /// Generate and store a secret unless one already exists.
    pub async fn register(&self, service: &str) -> Result<Registration, BrokerError> {
        let secret = ServiceSecret::generate();
        match self.create(service, secret.clone()).await {
            Ok(()) => Ok(Registration::Created(secret)),
            Err(BrokerError::SecretAlreadyExists { existing, .. }) => Ok(Registration::Existing(existing)),
            Err(e) => Err(e),
        }
    }

    /// Remove the secret if one exists.
    pub async fn remove(&self, service: &str) -> Result<Removal, BrokerError> {
        match self.delete(service).await {
            Ok(secret) => Ok(Removal::Deleted(secret)),
            Err(BrokerError::SecretNotFound { .. }) => Ok(Removal::NotFound),
            Err(e) => Err(e),
        }
    }
}
