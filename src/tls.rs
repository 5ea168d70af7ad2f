//! HTTPS listener configuration.

use crate::config::TlsConfig;
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Failed to load TLS key pair from {cert} and {key}: {source}")]
    KeyPair {
        cert: String,
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Load the PEM certificate chain and private key.
///
/// Installs the ring crypto provider as the process default unless one is
/// already installed.
pub async fn load(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    RustlsConfig::from_pem_file(&config.cert, &config.key)
        .await
        .map_err(|source| TlsError::KeyPair {
            cert: config.cert.display().to_string(),
            key: config.key.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_missing_key_pair() {
        let config = TlsConfig {
            cert: PathBuf::from("/nonexistent/cert.pem"),
            key: PathBuf::from("/nonexistent/key.pem"),
        };

        let err = load(&config).await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cert.pem"));
    }

    #[tokio::test]
    async fn test_garbage_pem_rejected() {
        let dir = std::env::temp_dir().join(format!("broker-tls-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let cert = dir.join("cert.pem");
        let key = dir.join("key.pem");
        std::fs::write(&cert, "not a certificate").unwrap();
        std::fs::write(&key, "not a key").unwrap();

        let result = load(&TlsConfig { cert, key }).await;
        std::fs::remove_dir_all(&dir).ok();

        assert!(matches!(result, Err(TlsError::KeyPair { .. })));
    }
}
