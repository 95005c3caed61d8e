//! Core protocol types for docq.
//!
//! Contains Job, JobStatus, the external JobView and related data structures.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::queue::types::now_ms;

/// Job lifecycle status.
///
/// `Pending -> Processing -> {Completed, Failed}`, with `Cancelled` reachable
/// from both non-terminal states. Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,    // Persisted, waiting for a worker
    Processing, // Claimed by exactly one worker
    Completed,  // Handler returned a result
    Failed,     // Handler or dispatch error
    Cancelled,  // Cancelled by a caller
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Store record. Callers see `JobView`.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub job_type: String,
    /// Handler input. Wrapped in Arc for cheap cloning (avoids copying large JSON).
    pub payload: Arc<Value>,
    pub priority: i32,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    /// Set when a caller cancels a job that is already processing.
    pub cancel_requested: bool,
    /// Insertion sequence assigned by the store (FIFO tie-breaker).
    pub seq: u64,
}

impl Job {
    /// Build a fresh pending job with a new unique id.
    pub fn new(job_type: impl Into<String>, payload: Value, priority: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_type: job_type.into(),
            payload: Arc::new(payload),
            priority,
            status: JobStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: now_ms(),
            started_at: None,
            completed_at: None,
            cancel_requested: false,
            seq: 0,
        }
    }

    #[inline(always)]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Caller-facing view of a job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub job_type: String,
    pub payload: Value,
    pub priority: i32,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub cancel_requested: bool,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            payload: Arc::unwrap_or_clone(job.payload),
            id: job.id,
            job_type: job.job_type,
            priority: job.priority,
            status: job.status,
            progress: job.progress,
            result: job.result,
            error: job.error,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            cancel_requested: job.cancel_requested,
        }
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total: u64,
}

impl JobStats {
    /// Add `count` jobs of `status`, keeping `total` in sync.
    pub fn record(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
            JobStatus::Cancelled => self.cancelled += count,
        }
        self.total += count;
    }
}

/// What a worker reports when a handler returns.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Value),
    Failed(String),
    /// The handler observed a cancel request and stopped early.
    Cancelled,
}

/// Result of a conditional `finish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    /// Terminal status written by this call.
    Recorded(JobStatus),
    /// Job was no longer processing; nothing written. Carries the current status.
    Conflict(JobStatus),
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Pending job moved straight to `Cancelled`.
    Cancelled,
    /// Processing job flagged; the handler decides when to stop.
    Requested,
    /// Job already terminal; nothing changed.
    AlreadyTerminal(JobStatus),
}
