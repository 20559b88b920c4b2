use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub proxy: Option<String>,
    pub active_jobs: usize,
    pub completed_videos: usize,
    pub timestamp: DateTime<Utc>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        proxy: state.proxy.as_ref().map(|p| p.url()),
        active_jobs: state.orchestrator.registry().active(),
        completed_videos: state.catalog().len(),
        timestamp: Utc::now(),
    })
}
