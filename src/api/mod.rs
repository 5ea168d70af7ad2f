//! HTTP surface.
//!
//! | Route | Success |
//! |---|---|
//! | `POST /authenticate` | `200 {"token": ...}` |
//! | `POST /validate` | `200`, empty body |
//! | `GET /health` | `200 {"ldap", "redis", "security"}` |
//! | `GET /metrics` | Prometheus text |
//! | `GET /rev.txt` | `REVISION_FILE` contents, when configured |
//! | `GET /docs` | `DOCS_FILE` contents, when configured |

pub mod handlers;
pub mod models;

use crate::config::Config;
use crate::error::{BrokerError, ErrorResponse};
use crate::service::{Authenticator, Collaborators, HealthChecker, Validator};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared handler state.
#[derive(Debug)]
pub struct AppState {
    pub authenticator: Authenticator,
    pub validator: Validator,
    pub health: HealthChecker,
    /// Include collaborator detail in error payloads
    pub debug: bool,
    pub revision_file: Option<PathBuf>,
    pub docs_file: Option<PathBuf>,
}

impl AppState {
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        Self {
            authenticator: Authenticator::new(collaborators.clone(), config),
            validator: Validator::new(collaborators.clone(), config),
            health: HealthChecker::new(collaborators, config),
            debug: config.debug,
            revision_file: config.revision_file.clone(),
            docs_file: config.docs_file.clone(),
        }
    }
}

/// Build the router with tracing, CORS and request-id layers.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/authenticate", post(handlers::authenticate))
        .route("/validate", post(handlers::validate))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::export_metrics));

    if let Some(ref path) = state.revision_file {
        app = app.route_service("/rev.txt", ServeFile::new(path));
    }
    if let Some(ref path) = state.docs_file {
        app = app.route_service("/docs", ServeFile::new(path));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(CorsLayer::permissive()),
    )
    .with_state(state)
}

/// [`BrokerError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    error: BrokerError,
    debug: bool,
}

impl ApiError {
    pub fn new(error: BrokerError, debug: bool) -> Self {
        Self { error, debug }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.error.is_internal() {
            error!(code = self.error.code().as_str(), error = %self.error, "request failed");
        }

        let status = self.error.status();
        let body = ErrorResponse::from_error(&self.error, self.debug);
        (status, Json(body)).into_response()
    }
}
