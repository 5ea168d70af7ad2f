use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Signed payload identifying a user, the service the token is scoped to,
/// and the authorized groups.
///
/// Never mutated once issued; a sliding refresh re-stores the same value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub username: String,
    pub service: String,
    pub groups: Vec<String>,

    /// Directory display name, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub jti: String,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl TokenClaims {
    pub fn new(username: String, service: String, groups: Vec<String>, ttl: Duration) -> Self {
        let now = chrono::Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        TokenClaims {
            username,
            service,
            groups,
            name: None,
            jti: uuid::Uuid::new_v4().to_string(),
            issued_at: now,
            expires_at: now.saturating_add(ttl),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.expires_at <= now
    }

    /// Whether the token identifies `username` on `service`.
    pub fn identifies(&self, username: &str, service: &str) -> bool {
        use subtle::ConstantTimeEq;
        let user = self.username.as_bytes().ct_eq(username.as_bytes());
        let svc = self.service.as_bytes().ct_eq(service.as_bytes());
        bool::from(user & svc)
    }
}
