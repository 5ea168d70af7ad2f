//! Token validation with sliding session refresh.

use super::{bounded, require, Collaborators};
use crate::config::Config;
use crate::error::BrokerError;
use crate::metrics;
use crate::store::SessionKey;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Validates presented tokens against their stored sessions.
#[derive(Debug, Clone)]
pub struct Validator {
    collaborators: Collaborators,
    session_ttl: Duration,
    timeout: Duration,
}

impl Validator {
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        Self {
            collaborators,
            session_ttl: config.redis.session_ttl,
            timeout: config.collaborator_timeout,
        }
    }

    /// Check that `token` is a live session for `username` on `service`.
    ///
    /// The stored session is looked up before the signature is trusted.
    /// On success the session is re-stored unchanged with a fresh TTL.
    #[instrument(skip(self, token))]
    pub async fn validate(&self, username: &str, service: &str, token: &str) -> Result<(), BrokerError> {
        let result = self.check(username, service, token).await;
        metrics::record_validation(&result);

        match result {
            Ok(()) => debug!("token validated"),
            Err(ref e) if e.is_internal() => warn!(error = %e, "validation failed"),
            Err(ref e) => debug!(code = e.code().as_str(), "token rejected"),
        }
        result
    }

    async fn check(&self, username: &str, service: &str, token: &str) -> Result<(), BrokerError> {
        require("username", username)?;
        require("service", service)?;
        require("token", token)?;

        let Collaborators {
            secrets,
            sessions,
            codec,
            ..
        } = &self.collaborators;

        let secret = bounded("secret_store", self.timeout, secrets.find(service))
            .await?
            .ok_or_else(|| BrokerError::not_registered(service))?;

        let key = SessionKey::new(username, service, token);
        let stored = bounded("session_store", self.timeout, sessions.get(&key))
            .await?
            .ok_or_else(|| BrokerError::TokenNotFound {
                service: service.to_string(),
            })?;

        let claims = codec.validate_token(token, &secret)?;

        // Evaluate both comparisons so the failing side is not observable
        let matches_request = claims.identifies(username, service);
        let matches_session = stored.identifies(&claims.username, &claims.service);
        if !(matches_request & matches_session) {
            return Err(BrokerError::TokenConsistency);
        }

        bounded("session_store", self.timeout, sessions.put(&key, &stored, self.session_ttl)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Authenticator;
    use crate::store::{SecretStore, ServiceSecret, SessionStore};
    use crate::testutil::{Fixture, PASSWORD, SERVICE, USERNAME};
    use crate::token::{TokenClaims, TokenCodec};

    fn config() -> Config {
        Config {
            collaborator_timeout: Duration::from_millis(200),
            ..Config::default()
        }
    }

    async fn issue(fixture: &Fixture) -> String {
        Authenticator::new(fixture.collaborators(), &config())
            .authenticate(USERNAME, PASSWORD, SERVICE, &["admins".to_string()])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_token() {
        let fixture = Fixture::new();
        let token = issue(&fixture).await;
        let validator = Validator::new(fixture.collaborators(), &config());

        assert!(validator.validate(USERNAME, SERVICE, &token).await.is_ok());
    }

    #[tokio::test]
    async fn test_sliding_refresh_keeps_claims() {
        let fixture = Fixture::new();
        let token = issue(&fixture).await;
        let validator = Validator::new(fixture.collaborators(), &config());
        let key = SessionKey::new(USERNAME, SERVICE, token.as_str());

        let before = fixture.sessions.inner().get(&key).await.unwrap().unwrap();
        let expiry_before = fixture.sessions.inner().expires_at(&key).unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        validator.validate(USERNAME, SERVICE, &token).await.unwrap();

        let after = fixture.sessions.inner().get(&key).await.unwrap().unwrap();
        assert_eq!(before, after);
        assert!(fixture.sessions.inner().expires_at(&key).unwrap() > expiry_before);
    }

    #[tokio::test]
    async fn test_unregistered_service() {
        let fixture = Fixture::new();
        let token = issue(&fixture).await;
        let validator = Validator::new(fixture.collaborators(), &config());

        let result = validator.validate(USERNAME, "payroll", &token).await;
        assert!(matches!(result, Err(BrokerError::ServiceNotRegistered { .. })));
    }

    #[tokio::test]
    async fn test_unknown_token_not_found() {
        let fixture = Fixture::new();
        let validator = Validator::new(fixture.collaborators(), &config());

        let result = validator.validate(USERNAME, SERVICE, "never-issued").await;
        assert!(matches!(result, Err(BrokerError::TokenNotFound { .. })));
    }

    #[tokio::test]
    async fn test_other_user_has_no_session() {
        let fixture = Fixture::new();
        let token = issue(&fixture).await;
        let validator = Validator::new(fixture.collaborators(), &config());

        let result = validator.validate("asmith", SERVICE, &token).await;
        assert!(matches!(result, Err(BrokerError::TokenNotFound { .. })));
    }

    #[tokio::test]
    async fn test_identity_substitution_rejected() {
        let fixture = Fixture::new();
        let token = issue(&fixture).await;
        let validator = Validator::new(fixture.collaborators(), &config());

        // A session planted under another user's name for the same token
        let planted = SessionKey::new("asmith", SERVICE, token.as_str());
        let claims = TokenClaims::new(
            "asmith".to_string(),
            SERVICE.to_string(),
            vec!["ADMINS".to_string()],
            Duration::from_secs(60),
        );
        fixture
            .sessions
            .put(&planted, &claims, Duration::from_secs(60))
            .await
            .unwrap();

        let result = validator.validate("asmith", SERVICE, &token).await;
        assert!(matches!(result, Err(BrokerError::TokenConsistency)));
    }

    #[tokio::test]
    async fn test_tampered_session_record_rejected() {
        let fixture = Fixture::new();
        let token = issue(&fixture).await;
        let validator = Validator::new(fixture.collaborators(), &config());
        let key = SessionKey::new(USERNAME, SERVICE, token.as_str());

        let mut stored = fixture.sessions.inner().get(&key).await.unwrap().unwrap();
        stored.username = "asmith".to_string();
        fixture
            .sessions
            .put(&key, &stored, Duration::from_secs(60))
            .await
            .unwrap();

        let result = validator.validate(USERNAME, SERVICE, &token).await;
        assert!(matches!(result, Err(BrokerError::TokenConsistency)));
    }

    #[tokio::test]
    async fn test_token_signed_for_other_service_rejected() {
        let fixture = Fixture::new();
        let validator = Validator::new(fixture.collaborators(), &config());

        let claims = TokenClaims::new(
            USERNAME.to_string(),
            SERVICE.to_string(),
            vec!["ADMINS".to_string()],
            Duration::from_secs(60),
        );
        let foreign = fixture
            .codec
            .create_token(&claims, &ServiceSecret::new("another-service-secret"))
            .unwrap();
        let key = SessionKey::new(USERNAME, SERVICE, foreign.as_str());
        fixture
            .sessions
            .put(&key, &claims, Duration::from_secs(60))
            .await
            .unwrap();

        let result = validator.validate(USERNAME, SERVICE, &foreign).await;
        assert!(matches!(result, Err(BrokerError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_rotated_secret_invalidates_tokens() {
        let fixture = Fixture::new();
        let token = issue(&fixture).await;
        let validator = Validator::new(fixture.collaborators(), &config());

        fixture.secrets.delete(SERVICE).await.unwrap();
        fixture
            .secrets
            .create_if_absent(SERVICE, &ServiceSecret::generate())
            .await
            .unwrap();

        let result = validator.validate(USERNAME, SERVICE, &token).await;
        assert!(matches!(result, Err(BrokerError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_expired_token_with_live_session() {
        let fixture = Fixture::new();
        let validator = Validator::new(fixture.collaborators(), &config());
        let secret = fixture.secrets.find(SERVICE).await.unwrap().unwrap();

        let mut claims = TokenClaims::new(
            USERNAME.to_string(),
            SERVICE.to_string(),
            vec!["ADMINS".to_string()],
            Duration::from_secs(60),
        );
        claims.issued_at -= 7200;
        claims.expires_at = claims.issued_at + 60;
        let token = fixture.codec.create_token(&claims, &secret).unwrap();

        let key = SessionKey::new(USERNAME, SERVICE, token.as_str());
        fixture
            .sessions
            .put(&key, &claims, Duration::from_secs(600))
            .await
            .unwrap();
        let expiry_before = fixture.sessions.inner().expires_at(&key).unwrap();

        let err = validator.validate(USERNAME, SERVICE, &token).await.unwrap_err();

        assert!(matches!(err, BrokerError::InvalidToken), "{err:?}");
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
        assert_eq!(fixture.sessions.inner().expires_at(&key), Some(expiry_before));
    }

    #[tokio::test]
    async fn test_secret_store_failure_is_not_unregistered() {
        let fixture = Fixture::new();
        let token = issue(&fixture).await;
        let validator = Validator::new(fixture.collaborators(), &config());

        fixture.secrets.set_unavailable(true);
        let err = validator.validate(USERNAME, SERVICE, &token).await.unwrap_err();

        assert!(matches!(err, BrokerError::Store { .. }), "{err:?}");
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_store_failures() {
        let fixture = Fixture::new();
        let token = issue(&fixture).await;
        let validator = Validator::new(fixture.collaborators(), &config());

        fixture.sessions.fail_put(true);
        let result = validator.validate(USERNAME, SERVICE, &token).await;
        assert!(matches!(result, Err(BrokerError::Store { .. })));

        fixture.sessions.fail_put(false);
        fixture.sessions.fail_get(true);
        let result = validator.validate(USERNAME, SERVICE, &token).await;
        assert!(matches!(result, Err(BrokerError::Store { .. })));
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let fixture = Fixture::new();
        let validator = Validator::new(fixture.collaborators(), &config());

        for (user, svc, token, field) in [
            ("", SERVICE, "t", "username"),
            (USERNAME, "", "t", "service"),
            (USERNAME, SERVICE, "", "token"),
        ] {
            let result = validator.validate(user, svc, token).await;
            assert!(matches!(result, Err(BrokerError::Validation { field: ref f }) if f == field));
        }
    }
}
