//! Orchestrators: token issuance, validation, secret lifecycle and health.
//!
//! Every orchestrator receives its collaborators as trait objects through
//! [`Collaborators`] and bounds each collaborator call with the configured
//! timeout. Nothing is retried; failures propagate to the caller.

pub mod authenticate;
pub mod health;
pub mod secrets;
pub mod validate;

pub use authenticate::Authenticator;
pub use health::{ComponentHealth, HealthChecker, HealthReport, HealthStatus};
pub use secrets::{Registration, Removal, SecretLifecycle};
pub use validate::Validator;

use crate::directory::{DirectoryError, DirectoryLookup};
use crate::error::BrokerError;
use crate::metrics::COLLABORATOR_LATENCY;
use crate::store::{SecretStore, SessionStore, StoreError};
use crate::token::TokenCodec;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Shared collaborator handles.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn DirectoryLookup>,
    pub secrets: Arc<dyn SecretStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub codec: Arc<dyn TokenCodec>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Collaborator errors that can express an expired deadline.
pub(crate) trait TimedOut {
    fn timed_out(after: Duration) -> Self;
}

impl TimedOut for DirectoryError {
    fn timed_out(after: Duration) -> Self {
        DirectoryError::Timeout(after)
    }
}

impl TimedOut for StoreError {
    fn timed_out(after: Duration) -> Self {
        StoreError::Timeout(after)
    }
}

/// Run a collaborator call under `limit`, recording its latency.
pub(crate) async fn bounded<T, E, F>(collaborator: &'static str, limit: Duration, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: TimedOut,
{
    let timer = COLLABORATOR_LATENCY
        .with_label_values(&[collaborator])
        .start_timer();

    let result = match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(E::timed_out(limit)),
    };

    timer.observe_duration();
    result
}

/// Reject a missing or blank request field.
pub(crate) fn require(field: &'static str, value: &str) -> Result<(), BrokerError> {
    if value.trim().is_empty() {
        return Err(BrokerError::validation(field));
    }
    Ok(())
}
