//! HTTP API request and response types.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::protocol::JobStats;
use crate::queue::{QueueError, QueueManager, WorkerState, DEFAULT_LIST_LIMIT};

/// Shared application state.
pub type AppState = Arc<QueueManager>;

/// Submit job request.
#[derive(Deserialize)]
pub struct SubmitRequest {
    pub job_type: String,
    #[serde(default = "empty_payload")]
    pub payload: Value,
    #[serde(default)]
    pub priority: i32,
}

fn empty_payload() -> Value {
    Value::Object(Default::default())
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub id: String,
}

/// Query params for job listing. Kept as raw strings so bad values get
/// the JSON error envelope instead of the extractor's plain-text rejection.
#[derive(Deserialize)]
pub struct JobsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

impl JobsQuery {
    pub fn parse_limit(&self) -> Result<usize, String> {
        match self.limit.as_deref() {
            None | Some("") => Ok(DEFAULT_LIST_LIMIT),
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| format!("invalid limit: {}", raw)),
        }
    }
}

#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub jobs: JobStats,
    pub running: bool,
    pub workers: Vec<WorkerState>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u64,
    pub backend: &'static str,
    pub running: bool,
    pub job_types: Vec<String>,
}

/// Generic API response.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Handler result: status code plus the JSON envelope.
pub type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> ApiResult<T> {
        (
            StatusCode::OK,
            Json(Self {
                ok: true,
                data: Some(data),
                error: None,
            }),
        )
    }

    pub fn error(status: StatusCode, msg: impl Into<String>) -> ApiResult<T> {
        (
            status,
            Json(Self {
                ok: false,
                data: None,
                error: Some(msg.into()),
            }),
        )
    }

    /// Map a queue error onto its HTTP status.
    pub fn from_queue_error(e: QueueError) -> ApiResult<T> {
        let status = match &e {
            QueueError::InvalidPayload(_) | QueueError::UnknownJobType(_) => {
                StatusCode::BAD_REQUEST
            }
            QueueError::NotFound(_) => StatusCode::NOT_FOUND,
            QueueError::Store(s) if s.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            QueueError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::error(status, e.to_string())
    }
}
