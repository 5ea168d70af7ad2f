//! Collaborator health probing.

use super::{bounded, Collaborators};
use crate::config::Config;
use serde::Serialize;
use std::fmt::Display;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    Available,
    Unavailable,
}

/// State of one collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    fn from_probe<E: Display>(component: &str, result: Result<(), E>, debug: bool) -> Self {
        match result {
            Ok(()) => Self {
                status: HealthStatus::Available,
                detail: None,
            },
            Err(e) => {
                warn!(component, error = %e, "health probe failed");
                Self {
                    status: HealthStatus::Unavailable,
                    detail: debug.then(|| e.to_string()),
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == HealthStatus::Available
    }
}

/// Health of every collaborator, keyed the way the HTTP reply expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ldap: ComponentHealth,
    pub redis: ComponentHealth,
    pub security: ComponentHealth,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.ldap.is_available() && self.redis.is_available() && self.security.is_available()
    }
}

/// Probes directory, secret store and codec concurrently.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    collaborators: Collaborators,
    timeout: Duration,
    debug: bool,
}

impl HealthChecker {
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        Self {
            collaborators,
            timeout: config.collaborator_timeout,
            debug: config.debug,
        }
    }

    pub async fn check(&self) -> HealthReport {
        let Collaborators {
            directory,
            secrets,
            codec,
            ..
        } = &self.collaborators;

        let (ldap, redis, security) = tokio::join!(
            bounded("directory", self.timeout, directory.health()),
            bounded("secret_store", self.timeout, secrets.health()),
            async { codec.health() },
        );

        HealthReport {
            ldap: ComponentHealth::from_probe("ldap", ldap, self.debug),
            redis: ComponentHealth::from_probe("redis", redis, self.debug),
            security: ComponentHealth::from_probe("security", security, self.debug),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{DirectoryFault, Fixture};

    #[tokio::test]
    async fn test_all_available() {
        let fixture = Fixture::new();
        let report = HealthChecker::new(fixture.collaborators(), &Config::default())
            .check()
            .await;

        assert!(report.is_healthy());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["ldap"]["status"], "Available");
        assert!(json["ldap"].get("detail").is_none());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_mask_others() {
        let fixture = Fixture::new().with_directory_fault(DirectoryFault::Health);
        let report = HealthChecker::new(fixture.collaborators(), &Config::default())
            .check()
            .await;

        assert_eq!(report.ldap.status, HealthStatus::Unavailable);
        assert!(report.ldap.detail.is_none());
        assert!(report.redis.is_available());
        assert!(report.security.is_available());
    }

    #[tokio::test]
    async fn test_detail_in_debug_mode() {
        let fixture = Fixture::new();
        fixture.secrets.set_unavailable(true);
        let config = Config {
            debug: true,
            ..Config::default()
        };

        let report = HealthChecker::new(fixture.collaborators(), &config).check().await;

        assert_eq!(report.redis.status, HealthStatus::Unavailable);
        assert!(report.redis.detail.as_deref().unwrap().contains("connection refused"));
    }
}
