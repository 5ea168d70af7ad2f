//! Request and response bodies.
//!
//! Request fields default to empty so that a missing field surfaces as a
//! validation error naming it rather than a generic parse failure.

use serde::{Deserialize, Serialize};

/// `POST /authenticate` body.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct AuthenticateRequest {
    pub username: String,
    pub password: String,
    pub service: String,
    pub groups: Vec<String>,
}

impl std::fmt::Debug for AuthenticateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticateRequest")
            .field("username", &self.username)
            .field("service", &self.service)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

/// `POST /validate` body.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ValidateRequest {
    pub username: String,
    pub service: String,
    pub token: String,
}

/// Issued token.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}
