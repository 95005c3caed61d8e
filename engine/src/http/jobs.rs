//! Job operation HTTP handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use crate::protocol::{CancelOutcome, JobStatus, JobView};

use super::types::{
    ApiResponse, ApiResult, AppState, JobsQuery, SubmitRequest, SubmitResponse,
};

/// Submit a job. Returns its id immediately; the job runs in the background.
pub async fn submit_job(
    State(qm): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<SubmitResponse> {
    match qm.submit(&req.job_type, req.payload, req.priority) {
        Ok(id) => {
            let (_, body) = ApiResponse::success(SubmitResponse { id });
            (StatusCode::CREATED, body)
        }
        Err(e) => ApiResponse::from_queue_error(e),
    }
}

/// List jobs, newest first, optionally filtered by status.
pub async fn list_jobs(
    State(qm): State<AppState>,
    Query(params): Query<JobsQuery>,
) -> ApiResult<Vec<JobView>> {
    let status = match params.status.as_deref().map(str::parse::<JobStatus>) {
        None => None,
        Some(Ok(status)) => Some(status),
        Some(Err(e)) => return ApiResponse::error(StatusCode::BAD_REQUEST, e),
    };
    let limit = match params.parse_limit() {
        Ok(limit) => limit,
        Err(e) => return ApiResponse::error(StatusCode::BAD_REQUEST, e),
    };

    match qm.list_jobs(status, limit) {
        Ok(jobs) => ApiResponse::success(jobs),
        Err(e) => ApiResponse::from_queue_error(e),
    }
}

/// Get a job snapshot (status, progress, result, error).
pub async fn get_job(State(qm): State<AppState>, Path(id): Path<String>) -> ApiResult<JobView> {
    match qm.get_job(&id) {
        Ok(job) => ApiResponse::success(job),
        Err(e) => ApiResponse::from_queue_error(e),
    }
}

/// Cancel a job. Pending jobs stop immediately, processing jobs at their
/// next checkpoint; terminal jobs are reported unchanged.
pub async fn cancel_job(
    State(qm): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<CancelOutcome> {
    match qm.cancel(&id) {
        Ok(outcome) => ApiResponse::success(outcome),
        Err(e) => ApiResponse::from_queue_error(e),
    }
}
