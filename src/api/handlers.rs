use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use super::AppError;
use crate::service::{RequestReport, ShiftService};
use crate::shift::Shift;

type AppState = State<Arc<ShiftService>>;

/// `POST /shifts`: process the batch before answering.
pub(super) async fn post_shifts(
    State(service): AppState,
    payload: Result<Json<Vec<Shift>>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(shifts) = payload?;
    let (report, listing) = service.submit_and_process(shifts).await?;
    Ok(Json(json!({
        "message": "Shifts processed",
        "requestId": report.request.id,
        "status": report.request.status,
        "summary": report.summary,
        "shifts": listing,
    })))
}

/// `GET /shifts`
pub(super) async fn list_shifts(State(service): AppState) -> Json<Value> {
    Json(json!({ "shifts": service.existing_shifts().await }))
}

/// `POST /requests`: record the batch and process it in the background.
pub(super) async fn create_request(
    State(service): AppState,
    payload: Result<Json<Vec<Shift>>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(shifts) = payload?;
    let request = service.submit(shifts).await?;
    service.spawn_processing(request.id);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "requestId": request.id,
            "status": request.status,
            "total": request.total,
        })),
    ))
}

/// `GET /requests/{id}`
pub(super) async fn get_request(
    State(service): AppState,
    Path(id): Path<String>,
) -> Result<Json<RequestReport>, AppError> {
    let request_id =
        Uuid::parse_str(&id).map_err(|_| AppError::BadRequest(format!("Invalid request id '{}'", id)))?;

    match service.report(request_id).await? {
        Some(report) => Ok(Json(report)),
        None => Err(AppError::NotFound(format!("Request {} not found", request_id))),
    }
}

/// `GET /health`
pub(super) async fn health(State(service): AppState) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "shards": service.store().shard_count(),
    }))
}
