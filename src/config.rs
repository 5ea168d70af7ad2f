//! Centralized configuration for the credential broker.
//!
//! All configuration is loaded from environment variables (optionally via a
//! `.env` file) and validated once at startup. The resulting [`Config`] is
//! passed explicitly into every collaborator and orchestrator.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid port number
    #[error("Invalid port: must be between 1 and 65535")]
    InvalidPort,

    /// Invalid TTL or timeout value
    #[error("Invalid {0}: must be greater than 0")]
    InvalidDuration(&'static str),

    /// Template without its placeholder
    #[error("{name} must contain the {placeholder} placeholder")]
    MissingPlaceholder {
        name: &'static str,
        placeholder: &'static str,
    },

    /// Invalid cipher key
    #[error("Invalid TOKEN_CIPHER_KEY: {0}")]
    InvalidCipherKey(String),

    /// Only one half of the TLS key pair is set
    #[error("TLS_CERT and TLS_KEY must be set together")]
    IncompleteTls,

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError { name: String, reason: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format {other}")),
        }
    }
}

/// Which directory adapter serves logins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryMode {
    Ldap,
    /// Accept any non-empty credentials; local development only
    Static,
}

impl std::str::FromStr for DirectoryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ldap" => Ok(Self::Ldap),
            "static" => Ok(Self::Static),
            other => Err(format!("unknown directory mode {other}")),
        }
    }
}

/// PEM files for the HTTPS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Directory connection settings.
#[derive(Debug, Clone)]
pub struct LdapConfig {
    /// `ldap://` or `ldaps://` URL
    pub url: String,
    /// Upgrade plain connections with StartTLS
    pub starttls: bool,
    /// Skip certificate verification
    pub skip_tls_verify: bool,
    /// Search base for users and groups
    pub base_dn: String,
    /// Bind DN template containing `{username}`
    pub bind_dn: String,
    /// User search filter containing `{username}`
    pub user_filter: String,
    /// Group search filter containing `{dn}`
    pub group_filter: String,
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            url: "ldap://localhost:389".to_string(),
            starttls: false,
            skip_tls_verify: false,
            base_dn: "dc=example,dc=org".to_string(),
            bind_dn: "uid={username},ou=people,dc=example,dc=org".to_string(),
            user_filter: "(uid={username})".to_string(),
            group_filter: "(member={dn})".to_string(),
        }
    }
}

/// Secret and session store settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Sliding session lifetime
    pub session_ttl: Duration,
    pub session_key_prefix: String,
    pub secret_key_prefix: String,
    /// Secret expiry, `None` keeps secrets forever
    pub secret_ttl: Option<Duration>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            session_ttl: Duration::from_secs(1800),
            session_key_prefix: "token".to_string(),
            secret_key_prefix: "serviceapikey".to_string(),
            secret_ttl: None,
        }
    }
}

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Include internal detail in error and health payloads
    pub debug: bool,
    pub log_format: LogFormat,
    /// Serve HTTPS when set
    pub tls: Option<TlsConfig>,
    /// File exposed at `/rev.txt`
    pub revision_file: Option<PathBuf>,
    /// API description exposed at `/docs`
    pub docs_file: Option<PathBuf>,

    // Collaborators
    pub directory_mode: DirectoryMode,
    pub ldap: LdapConfig,
    pub redis: RedisConfig,

    // Tokens
    /// Lifetime embedded as `exp`
    pub token_ttl: Duration,
    /// AES-256-GCM key; tokens are sealed when present
    pub token_cipher_key: Option<[u8; 32]>,

    /// Bound on every directory and store call
    pub collaborator_timeout: Duration,
    /// Drain period on shutdown
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: false,
            log_format: LogFormat::Json,
            tls: None,
            revision_file: None,
            docs_file: None,
            directory_mode: DirectoryMode::Ldap,
            ldap: LdapConfig::default(),
            redis: RedisConfig::default(),
            token_ttl: Duration::from_secs(3600),
            token_cipher_key: None,
            collaborator_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the result fails
    /// validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_source(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_source<F>(source: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |name: &str, default: &str| source(name).unwrap_or_else(|| default.to_string());
        let path = |name: &str| source(name).filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        let defaults = Config::default();

        let ldap = LdapConfig {
            url: string("LDAP_URL", &defaults.ldap.url),
            starttls: parse_env(&source, "LDAP_STARTTLS", false)?,
            skip_tls_verify: parse_env(&source, "LDAP_SKIP_TLS_VERIFY", false)?,
            base_dn: string("LDAP_BASE_DN", &defaults.ldap.base_dn),
            bind_dn: string("LDAP_BIND_DN", &defaults.ldap.bind_dn),
            user_filter: string("LDAP_USER_FILTER", &defaults.ldap.user_filter),
            group_filter: string("LDAP_GROUP_FILTER", &defaults.ldap.group_filter),
        };

        let secret_ttl = parse_env(&source, "SECRET_TTL", 0u64)?;
        let redis = RedisConfig {
            url: string("REDIS_URL", &defaults.redis.url),
            session_ttl: Duration::from_secs(parse_env(&source, "SESSION_TTL", 1800)?),
            session_key_prefix: string("SESSION_KEY_PREFIX", &defaults.redis.session_key_prefix),
            secret_key_prefix: string("SECRET_KEY_PREFIX", &defaults.redis.secret_key_prefix),
            secret_ttl: (secret_ttl > 0).then(|| Duration::from_secs(secret_ttl)),
        };

        let tls = match (path("TLS_CERT"), path("TLS_KEY")) {
            (Some(cert), Some(key)) => Some(TlsConfig { cert, key }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        let config = Self {
            host: string("HOST", &defaults.host),
            port: parse_env(&source, "PORT", defaults.port)?,
            debug: parse_env(&source, "DEBUG", false)?,
            log_format: parse_env(&source, "LOG_FORMAT", LogFormat::Json)?,
            tls,
            revision_file: path("REVISION_FILE"),
            docs_file: path("DOCS_FILE"),
            directory_mode: parse_env(&source, "DIRECTORY_MODE", DirectoryMode::Ldap)?,
            ldap,
            redis,
            token_ttl: Duration::from_secs(parse_env(&source, "TOKEN_TTL", 3600)?),
            token_cipher_key: source("TOKEN_CIPHER_KEY")
                .filter(|v| !v.is_empty())
                .map(|v| parse_cipher_key(&v))
                .transpose()?,
            collaborator_timeout: Duration::from_secs(parse_env(&source, "COLLABORATOR_TIMEOUT", 5)?),
            shutdown_timeout: Duration::from_secs(parse_env(&source, "SHUTDOWN_TIMEOUT", 10)?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        for (name, value) in [
            ("SESSION_TTL", self.redis.session_ttl),
            ("TOKEN_TTL", self.token_ttl),
            ("COLLABORATOR_TIMEOUT", self.collaborator_timeout),
            ("SHUTDOWN_TIMEOUT", self.shutdown_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidDuration(name));
            }
        }

        for (name, value, placeholder) in [
            ("LDAP_BIND_DN", &self.ldap.bind_dn, "{username}"),
            ("LDAP_USER_FILTER", &self.ldap.user_filter, "{username}"),
            ("LDAP_GROUP_FILTER", &self.ldap.group_filter, "{dn}"),
        ] {
            if !value.contains(placeholder) {
                return Err(ConfigError::MissingPlaceholder { name, placeholder });
            }
        }

        Ok(())
    }

    /// Socket address string to bind the HTTP server to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a variable with a default value.
fn parse_env<F, T>(source: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match source(name) {
        Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_cipher_key(value: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = STANDARD
        .decode(value.trim())
        .map_err(|e| ConfigError::InvalidCipherKey(e.to_string()))?;

    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| ConfigError::InvalidCipherKey(format!("must be 32 bytes, got {}", bytes.len())))
}
