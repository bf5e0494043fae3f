//! Job API handlers
//!
//! POST /create_song, GET /song_progress/:job_id, POST /stop_job/:job_id,
//! POST /clear_job/:job_id, GET /jobs

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::models::ConversionRequest;
use crate::services::{project, JobError, JobProgressRecord};
use crate::AppState;

/// POST /create_song response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSongResponse {
    pub job_id: String,
}

/// POST /stop_job response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopJobResponse {
    pub job_id: String,
    /// False when the job had already finished
    pub stop_requested: bool,
}

/// POST /clear_job response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearJobResponse {
    pub job_id: String,
    pub cleared: bool,
}

/// POST /create_song
///
/// Validates and queues a conversion; returns as soon as the job is queued.
pub async fn create_song(
    State(state): State<AppState>,
    Json(request): Json<ConversionRequest>,
) -> ApiResult<Json<CreateSongResponse>> {
    match state.jobs.submit(request) {
        Ok(job_id) => Ok(Json(CreateSongResponse { job_id })),
        Err(err) => {
            tracing::warn!(kind = err.kind(), error = %err, "Rejected conversion request");
            if !matches!(err, JobError::Validation(_)) {
                state.record_error(err.to_string()).await;
            }
            Err(err.into())
        }
    }
}

/// GET /song_progress/:job_id
///
/// Unknown ids are not an HTTP error: the record reports `unknown_job`.
pub async fn song_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Json<JobProgressRecord> {
    let job = state.jobs.snapshot(&job_id);
    tracing::debug!(job_id = %job_id, found = job.is_some(), "Progress query");
    Json(project(job.as_ref(), Utc::now(), state.stale_after))
}

/// POST /stop_job/:job_id
pub async fn stop_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StopJobResponse>> {
    let stop_requested = state
        .jobs
        .request_stop(&job_id)
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", job_id)))?;
    Ok(Json(StopJobResponse {
        job_id,
        stop_requested,
    }))
}

/// POST /clear_job/:job_id
pub async fn clear_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ClearJobResponse>> {
    if !state.jobs.clear(&job_id) {
        return Err(ApiError::NotFound(format!("Job not found: {}", job_id)));
    }
    Ok(Json(ClearJobResponse {
        job_id,
        cleared: true,
    }))
}

/// GET /jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobProgressRecord>> {
    let now = Utc::now();
    let records = state
        .jobs
        .list()
        .iter()
        .map(|job| project(Some(job), now, state.stale_after))
        .collect();
    Json(records)
}

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/create_song", post(create_song))
        .route("/song_progress/:job_id", get(song_progress))
        .route("/stop_job/:job_id", post(stop_job))
        .route("/clear_job/:job_id", post(clear_job))
        .route("/jobs", get(list_jobs))
}
