//! Error handling module for the credential broker.
//!
//! Provides a single taxonomy for every failure the orchestrators can
//! surface, with:
//! - Stable error codes for programmatic handling
//! - HTTP status mapping for the public boundary
//! - Suppression of collaborator detail unless running in debug mode

use crate::directory::DirectoryError;
use crate::store::{ServiceSecret, StoreError};
use crate::token::CodecError;
use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Broker error taxonomy.
///
/// Token failures (`InvalidToken`, `TokenConsistency`) intentionally carry
/// no cause so callers cannot tell a bad signature from an expired or
/// substituted token.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BrokerError {
    /// A required request field is missing or empty
    #[error("{field} is empty")]
    Validation {
        /// Name of the offending field
        field: String,
    },

    /// No secret is registered for the service
    #[error("Service {service} is not registered, please contact the admin team in order to register")]
    ServiceNotRegistered {
        /// Service name from the request
        service: String,
    },

    /// Directory rejected the username/password pair
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token failed signature, format or expiry checks
    #[error("The provided token is invalid")]
    InvalidToken,

    /// Authenticated user holds none of the requested groups
    #[error("None of the user groups are valid")]
    AccessDenied,

    /// No live session exists for the (username, service, token) key
    #[error("Token not found for service: {service}")]
    TokenNotFound {
        /// Service name from the request
        service: String,
    },

    /// Decoded identity does not match the request or the stored session
    #[error("The provided token is invalid")]
    TokenConsistency,

    /// Directory could not be reached
    #[error("Directory unavailable: {detail}")]
    DirectoryUnavailable {
        /// Raw collaborator error text
        detail: String,
    },

    /// Directory lookup failed after connecting
    #[error("Directory error: {detail}")]
    Directory {
        /// Raw collaborator error text
        detail: String,
    },

    /// Secret or session store operation failed
    #[error("Store error: {detail}")]
    Store {
        /// Raw collaborator error text
        detail: String,
    },

    /// Token could not be built or signed
    #[error("Token encoding error: {detail}")]
    Encoding {
        /// Raw codec error text
        detail: String,
    },

    /// A secret is already registered for the service
    #[error("A secret already exists for service {service}")]
    SecretAlreadyExists {
        /// Service name
        service: String,
        /// The secret that remains in place
        existing: ServiceSecret,
    },

    /// No secret is registered for the service being removed
    #[error("No secret exists for service {service}")]
    SecretNotFound {
        /// Service name
        service: String,
    },
}

/// Stable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    ServiceNotRegistered,
    Authentication,
    AccessDenied,
    TokenNotFound,
    TokenConsistency,
    DirectoryUnavailable,
    Directory,
    Store,
    Encoding,
    SecretExists,
    SecretNotFound,
}

impl ErrorCode {
    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::ServiceNotRegistered => "SERVICE_NOT_REGISTERED",
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::TokenNotFound => "TOKEN_NOT_FOUND",
            Self::TokenConsistency => "TOKEN_CONSISTENCY_ERROR",
            Self::DirectoryUnavailable => "DIRECTORY_UNAVAILABLE",
            Self::Directory => "DIRECTORY_ERROR",
            Self::Store => "STORE_ERROR",
            Self::Encoding => "ENCODING_ERROR",
            Self::SecretExists => "SECRET_EXISTS",
            Self::SecretNotFound => "SECRET_NOT_FOUND",
        }
    }
}

impl BrokerError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::ServiceNotRegistered { .. } => ErrorCode::ServiceNotRegistered,
            Self::InvalidCredentials | Self::InvalidToken => ErrorCode::Authentication,
            Self::AccessDenied => ErrorCode::AccessDenied,
            Self::TokenNotFound { .. } => ErrorCode::TokenNotFound,
            Self::TokenConsistency => ErrorCode::TokenConsistency,
            Self::DirectoryUnavailable { .. } => ErrorCode::DirectoryUnavailable,
            Self::Directory { .. } => ErrorCode::Directory,
            Self::Store { .. } => ErrorCode::Store,
            Self::Encoding { .. } => ErrorCode::Encoding,
            Self::SecretAlreadyExists { .. } => ErrorCode::SecretExists,
            Self::SecretNotFound { .. } => ErrorCode::SecretNotFound,
        }
    }

    /// HTTP status returned at the public boundary.
    ///
    /// Token failures on `/validate` answer 404 rather than 401 so that a
    /// forged token is indistinguishable from an unknown one.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::ServiceNotRegistered { .. } | Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::InvalidToken | Self::TokenNotFound { .. } | Self::TokenConsistency => {
                StatusCode::NOT_FOUND
            }
            Self::SecretAlreadyExists { .. } => StatusCode::CONFLICT,
            Self::SecretNotFound { .. } => StatusCode::NOT_FOUND,
            Self::DirectoryUnavailable { .. }
            | Self::Directory { .. }
            | Self::Store { .. }
            | Self::Encoding { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Raw collaborator detail, if this error wraps one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::DirectoryUnavailable { detail }
            | Self::Directory { detail }
            | Self::Store { detail }
            | Self::Encoding { detail } => Some(detail),
            _ => None,
        }
    }

    /// Whether this error originates from a collaborator rather than the caller
    pub fn is_internal(&self) -> bool {
        self.status().is_server_error()
    }

    pub(crate) fn validation(field: impl Into<String>) -> Self {
        Self::Validation { field: field.into() }
    }

    pub(crate) fn not_registered(service: impl Into<String>) -> Self {
        Self::ServiceNotRegistered {
            service: service.into(),
        }
    }
}

/// Structured error payload: `{"error": {"code", "message", "detail"?}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error body
    pub error: ErrorBody,
}

/// Error body of [`ErrorResponse`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable error code
    pub code: &'static str,
    /// Human-readable message (sanitized)
    pub message: String,
    /// Internal detail, only populated in debug mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response from a [`BrokerError`]
    pub fn from_error(error: &BrokerError, debug: bool) -> Self {
        let message = match error {
            BrokerError::DirectoryUnavailable { .. } => "Directory temporarily unavailable".to_string(),
            BrokerError::Directory { .. } => "Error retrieving groups".to_string(),
            BrokerError::Store { .. } => "Session storage temporarily unavailable".to_string(),
            BrokerError::Encoding { .. } => "Unable to issue token".to_string(),
            // Never echo the existing secret back through an error payload
            BrokerError::SecretAlreadyExists { service, .. } => {
                format!("A secret already exists for service {service}")
            }
            other => other.to_string(),
        };

        let detail = if debug {
            error.detail().map(str::to_string)
        } else {
            None
        };

        Self {
            error: ErrorBody {
                code: error.code().as_str(),
                message,
                detail,
            },
        }
    }
}

impl From<StoreError> for BrokerError {
    fn from(err: StoreError) -> Self {
        BrokerError::Store {
            detail: err.to_string(),
        }
    }
}

impl From<CodecError> for BrokerError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encoding(detail) => BrokerError::Encoding { detail },
            CodecError::Invalid => BrokerError::InvalidToken,
        }
    }
}

impl From<DirectoryError> for BrokerError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::InvalidCredentials => BrokerError::InvalidCredentials,
            DirectoryError::Unavailable(detail) => BrokerError::DirectoryUnavailable { detail },
            DirectoryError::Timeout(after) => BrokerError::DirectoryUnavailable {
                detail: format!("directory call timed out after {after:?}"),
            },
            other => BrokerError::Directory {
                detail: other.to_string(),
            },
        }
    }
}
