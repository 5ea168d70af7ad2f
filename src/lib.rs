//! Credential broker library.
//!
//! Issues and validates short-lived bearer tokens for client services.
//! Users are authenticated against a directory, tokens are signed with a
//! per-service secret, and every issued token is backed by a session record
//! with a sliding expiry.

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod directory;
pub mod error;
pub mod groups;
pub mod metrics;
pub mod observability;
pub mod service;
pub mod shutdown;
pub mod store;
pub mod tls;
pub mod token;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-exports for convenience
pub use config::Config;
pub use error::BrokerError;
