//! Token codec trait and the JWT implementation.

use super::cipher::TokenCipher;
use super::claims::TokenClaims;
use crate::store::ServiceSecret;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Codec failures.
///
/// Verification failures are deliberately a single variant so the cause
/// (signature, format, expiry) never reaches the caller.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("token encoding failed: {0}")]
    Encoding(String),

    #[error("token is invalid")]
    Invalid,
}

/// Builds and verifies signed, time-bounded claims tokens.
pub trait TokenCodec: Send + Sync {
    /// Serialize and sign `claims` with the per-service `secret`.
    fn create_token(&self, claims: &TokenClaims, secret: &ServiceSecret) -> Result<String, CodecError>;

    /// Verify `token` against `secret` and return its claims.
    ///
    /// Fails for tokens signed with any other secret, and for expired tokens.
    fn validate_token(&self, token: &str, secret: &ServiceSecret) -> Result<TokenClaims, CodecError>;

    /// Self-test of the signing configuration.
    fn health(&self) -> Result<(), CodecError>;
}

/// HS256 JWT codec with an optional encryption envelope.
#[derive(Debug, Clone, Default)]
pub struct JwtCodec {
    cipher: Option<TokenCipher>,
}

impl JwtCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cipher(mut self, cipher: TokenCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);
        validation
    }
}

impl TokenCodec for JwtCodec {
    fn create_token(&self, claims: &TokenClaims, secret: &ServiceSecret) -> Result<String, CodecError> {
        if secret.is_empty() {
            return Err(CodecError::Encoding("empty signing secret".to_string()));
        }

        let key = EncodingKey::from_secret(secret.expose().as_bytes());
        let jwt = encode(&Header::new(Algorithm::HS256), claims, &key)
            .map_err(|e| CodecError::Encoding(e.to_string()))?;

        match self.cipher {
            Some(ref cipher) => cipher.seal(&jwt),
            None => Ok(jwt),
        }
    }

    fn validate_token(&self, token: &str, secret: &ServiceSecret) -> Result<TokenClaims, CodecError> {
        if secret.is_empty() {
            return Err(CodecError::Invalid);
        }

        let jwt = match self.cipher {
            Some(ref cipher) => cipher.open(token)?,
            None => token.to_string(),
        };

        let key = DecodingKey::from_secret(secret.expose().as_bytes());
        let data = decode::<TokenClaims>(&jwt, &key, &Self::validation()).map_err(|e| {
            debug!(reason = rejection_reason(&e), "token rejected");
            CodecError::Invalid
        })?;

        Ok(data.claims)
    }

    fn health(&self) -> Result<(), CodecError> {
        let probe = ServiceSecret::generate();
        let claims = TokenClaims::new(
            "health".to_string(),
            "health".to_string(),
            vec!["HEALTH".to_string()],
            Duration::from_secs(60),
        );

        let token = self.create_token(&claims, &probe)?;
        let decoded = self
            .validate_token(&token, &probe)
            .map_err(|_| CodecError::Encoding("signing self-test failed".to_string()))?;

        if decoded != claims {
            return Err(CodecError::Encoding("signing self-test mismatch".to_string()));
        }
        Ok(())
    }
}

/// Short rejection reason, logged at debug level only.
fn rejection_reason(err: &jsonwebtoken::errors::Error) -> &'static str {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => "expired",
        ErrorKind::InvalidSignature => "signature",
        ErrorKind::InvalidAlgorithm => "algorithm",
        ErrorKind::MissingRequiredClaim(_) => "missing_claim",
        ErrorKind::Json(_) => "payload",
        _ => "format",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(ttl: Duration) -> TokenClaims {
        TokenClaims::new(
            "jdoe".to_string(),
            "billing".to_string(),
            vec!["ADMINS".to_string(), "USERS".to_string()],
            ttl,
        )
        .with_name("John Doe")
    }

    #[test]
    fn test_round_trip() {
        let codec = JwtCodec::new();
        let secret = ServiceSecret::new("service-a-secret");
        let original = claims(Duration::from_secs(3600));

        let token = codec.create_token(&original, &secret).unwrap();
        let decoded = codec.validate_token(&token, &secret).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn test_round_trip_encrypted() {
        let codec = JwtCodec::new().with_cipher(TokenCipher::new(&[9u8; 32]));
        let secret = ServiceSecret::new("service-a-secret");
        let original = claims(Duration::from_secs(3600));

        let token = codec.create_token(&original, &secret).unwrap();
        assert_eq!(token.matches('.').count(), 0);
        assert_eq!(codec.validate_token(&token, &secret).unwrap(), original);
    }

    #[test]
    fn test_key_isolation() {
        let codec = JwtCodec::new();
        let token = codec
            .create_token(&claims(Duration::from_secs(3600)), &ServiceSecret::new("secret-a"))
            .unwrap();

        let result = codec.validate_token(&token, &ServiceSecret::new("secret-b"));
        assert!(matches!(result, Err(CodecError::Invalid)));
    }

    #[test]
    fn test_expired_rejected() {
        let codec = JwtCodec::new();
        let secret = ServiceSecret::new("secret");
        let mut expired = claims(Duration::from_secs(3600));
        expired.issued_at -= 7200;
        expired.expires_at = expired.issued_at + 60;

        let token = codec.create_token(&expired, &secret).unwrap();
        assert!(matches!(codec.validate_token(&token, &secret), Err(CodecError::Invalid)));
    }

    #[test]
    fn test_tampered_rejected() {
        let codec = JwtCodec::new();
        let secret = ServiceSecret::new("secret");
        let token = codec.create_token(&claims(Duration::from_secs(60)), &secret).unwrap();

        let forged = {
            use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
            let mut forged = claims(Duration::from_secs(60));
            forged.username = "root".to_string();
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap())
        };
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged;

        let result = codec.validate_token(&parts.join("."), &secret);
        assert!(matches!(result, Err(CodecError::Invalid)));
    }

    #[test]
    fn test_malformed_rejected() {
        let codec = JwtCodec::new();
        let secret = ServiceSecret::new("secret");
        assert!(matches!(codec.validate_token("", &secret), Err(CodecError::Invalid)));
        assert!(matches!(codec.validate_token("a.b.c", &secret), Err(CodecError::Invalid)));
    }

    #[test]
    fn test_empty_secret_refused() {
        let codec = JwtCodec::new();
        let result = codec.create_token(&claims(Duration::from_secs(60)), &ServiceSecret::new(""));
        assert!(matches!(result, Err(CodecError::Encoding(_))));
    }

    #[test]
    fn test_health() {
        assert!(JwtCodec::new().health().is_ok());
        assert!(JwtCodec::new().with_cipher(TokenCipher::new(&[3u8; 32])).health().is_ok());
    }
}
