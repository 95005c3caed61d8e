//! Stats and health endpoints.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::State;

use super::types::{ApiResponse, ApiResult, AppState, HealthResponse, StatsResponse};

static START_TIME: OnceLock<Instant> = OnceLock::new();

pub(super) fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Job counts per status plus worker pool state.
pub async fn get_stats(State(qm): State<AppState>) -> ApiResult<StatsResponse> {
    match qm.stats() {
        Ok(jobs) => ApiResponse::success(StatsResponse {
            jobs,
            running: qm.is_running(),
            workers: qm.worker_states(),
        }),
        Err(e) => ApiResponse::from_queue_error(e),
    }
}

/// Always 200 while the HTTP server is responsive.
pub async fn health_check(State(qm): State<AppState>) -> ApiResult<HealthResponse> {
    let uptime_ms = START_TIME
        .get()
        .map(|t| t.elapsed().as_millis() as u64)
        .unwrap_or(0);

    ApiResponse::success(HealthResponse {
        status: "healthy",
        uptime_ms,
        backend: qm.backend_name(),
        running: qm.is_running(),
        job_types: qm.job_types(),
    })
}
