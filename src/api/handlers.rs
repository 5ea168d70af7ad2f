//! Route handlers.

use super::models::{AuthenticateRequest, TokenResponse, ValidateRequest};
use super::{ApiError, AppState};
use crate::error::BrokerError;
use crate::metrics;
use crate::service::HealthReport;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use tracing::{debug, error};

/// `POST /authenticate`
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AuthenticateRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = body.map_err(|e| state.reject(e))?;

    let token = state
        .authenticator
        .authenticate(
            &request.username,
            &request.password,
            &request.service,
            &request.groups,
        )
        .await
        .map_err(|e| state.error(e))?;

    Ok(Json(TokenResponse { token }))
}

/// `POST /validate`
pub async fn validate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = body.map_err(|e| state.reject(e))?;

    state
        .validator
        .validate(&request.username, &request.service, &request.token)
        .await
        .map_err(|e| state.error(e))?;

    Ok(StatusCode::OK)
}

/// `GET /health`, always 200.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.health.check().await)
}

/// `GET /metrics`
pub async fn export_metrics() -> impl IntoResponse {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

impl AppState {
    fn error(&self, error: BrokerError) -> ApiError {
        ApiError::new(error, self.debug)
    }

    fn reject(&self, rejection: JsonRejection) -> ApiError {
        debug!(reason = %rejection.body_text(), "request body rejected");
        self.error(BrokerError::validation("body"))
    }
}
