//! Prometheus metrics for the credential broker.
//!
//! Provides counters and histograms for observability, exposed in text
//! format through [`render`].

use crate::error::{BrokerError, ErrorCode};
use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder};

/// Authentication attempts counter.
pub static AUTHENTICATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "broker_authentications_total",
        "Total number of authentication attempts",
        &["outcome"]
    )
    .expect("Failed to register authentications metric")
});

/// Token validations counter.
pub static VALIDATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "broker_validations_total",
        "Total number of token validations",
        &["outcome"]
    )
    .expect("Failed to register validations metric")
});

/// Secret lifecycle operations counter.
pub static SECRET_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "broker_secret_operations_total",
        "Total number of secret lifecycle operations",
        &["operation", "outcome"]
    )
    .expect("Failed to register secret_operations metric")
});

/// Collaborator call latency histogram.
pub static COLLABORATOR_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "broker_collaborator_latency_seconds",
        "Directory, store and codec call latency in seconds",
        &["collaborator"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register collaborator_latency metric")
});

/// Outcome label for a finished operation.
pub fn outcome<T>(result: &Result<T, BrokerError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => match e.code() {
            ErrorCode::Validation => "invalid_request",
            ErrorCode::ServiceNotRegistered => "not_registered",
            ErrorCode::Authentication => "rejected",
            ErrorCode::AccessDenied => "access_denied",
            ErrorCode::TokenNotFound => "not_found",
            ErrorCode::TokenConsistency => "inconsistent",
            ErrorCode::SecretExists => "exists",
            ErrorCode::SecretNotFound => "not_found",
            _ => "error",
        },
    }
}

/// Record an authentication attempt.
pub fn record_authentication<T>(result: &Result<T, BrokerError>) {
    AUTHENTICATIONS.with_label_values(&[outcome(result)]).inc();
}

/// Record a token validation.
pub fn record_validation<T>(result: &Result<T, BrokerError>) {
    VALIDATIONS.with_label_values(&[outcome(result)]).inc();
}

/// Record a secret lifecycle operation.
pub fn record_secret_operation<T>(operation: &str, result: &Result<T, BrokerError>) {
    SECRET_OPERATIONS
        .with_label_values(&[operation, outcome(result)])
        .inc();
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
