use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use super::error::ApiError;
use crate::core::models::DownloadRequest;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DownloadStarted {
    pub status: &'static str,
    pub message: &'static str,
    pub title: String,
}

pub async fn submit(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<DownloadStarted>, ApiError> {
    info!("Received download request");
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let url = request.url.unwrap_or_default();
    let submission = state.orchestrator.submit(&url).await?;

    Ok(Json(DownloadStarted {
        status: "success",
        message: "Download started",
        title: submission.title,
    }))
}

pub async fn list_videos(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "videos": state.catalog().list() }))
}
