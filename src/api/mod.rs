//! HTTP surface of the relay.
//!
//! | Method | Path | |
//! |---|---|---|
//! | POST | `/shifts` | submit a batch and wait for it |
//! | GET | `/shifts` | scheduling API listing |
//! | POST | `/requests` | submit a batch, processed in the background |
//! | GET | `/requests/{id}` | request report |
//! | GET | `/health` | liveness |
//! | GET | `/metrics` | Prometheus exposition |

mod handlers;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error::ServiceError;
use crate::service::ShiftService;

/// Build the application router.
pub fn router(service: Arc<ShiftService>) -> Router {
    Router::new()
        .route(
            "/shifts",
            get(handlers::list_shifts).post(handlers::post_shifts),
        )
        .route("/requests", axum::routing::post(handlers::create_request))
        .route("/requests/{id}", get(handlers::get_request))
        .route("/health", get(handlers::health))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Error returned by handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(e) => AppError::BadRequest(e.to_string()),
            ServiceError::RequestNotFound(id) => AppError::NotFound(format!("Request {} not found", id)),
            ServiceError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure while handling request");
                AppError::Internal("storage failure".to_string())
            }
        }
    }
}

/// Malformed bodies are client errors like any other validation failure.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AppError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
