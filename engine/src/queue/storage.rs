//! Storage abstraction layer for docq persistence.
//!
//! Every job mutation goes through a `JobStore`. Implementations must make
//! `claim_next`, `finish` and `request_cancel` atomic with respect to each
//! other: that is the only synchronisation point between workers.

use crate::protocol::{CancelOutcome, FinishOutcome, Job, JobOutcome, JobStats, JobStatus};

use super::config::RecoveryPolicy;
use super::error::StoreError;

/// Error message recorded on jobs failed by `RecoveryPolicy::Fail`.
pub const INTERRUPTED_ERROR: &str = "interrupted: process stopped while job was processing";

/// Common storage interface.
pub trait JobStore: Send + Sync {
    /// Get the storage backend name for logging.
    fn name(&self) -> &'static str;

    /// Persist a new pending job. Assigns the insertion sequence.
    fn insert(&self, job: &Job) -> Result<(), StoreError>;

    /// Atomically take the highest-priority, oldest pending job and mark it
    /// processing. `None` when nothing is pending.
    fn claim_next(&self) -> Result<Option<Job>, StoreError> {
        self.claim_next_up_to(u64::MAX)
    }

    /// Like `claim_next`, restricted to jobs whose insertion sequence is at
    /// most `max_seq`. Newer pending jobs are left untouched.
    fn claim_next_up_to(&self, max_seq: u64) -> Result<Option<Job>, StoreError>;

    /// Highest insertion sequence assigned so far (0 for an empty store).
    fn last_seq(&self) -> Result<u64, StoreError>;

    /// Raise progress of a processing job. Returns false (and writes
    /// nothing) when the job is not processing.
    fn update_progress(&self, id: &str, percent: u8) -> Result<bool, StoreError>;

    /// Move a processing job to its terminal state. Never overwrites a job
    /// that is no longer processing; a pending cancel request wins.
    fn finish(&self, id: &str, outcome: JobOutcome) -> Result<FinishOutcome, StoreError>;

    /// Cancel a pending job, or flag a processing one.
    fn request_cancel(&self, id: &str) -> Result<CancelOutcome, StoreError>;

    /// Whether the handler running `id` should stop at its next checkpoint.
    fn is_cancel_requested(&self, id: &str) -> Result<bool, StoreError>;

    fn get(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Newest-first listing, optionally filtered by status.
    fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, StoreError>;

    fn stats(&self) -> Result<JobStats, StoreError>;

    /// Resolve jobs left processing by a previous process. Returns how many
    /// rows were touched.
    fn recover_interrupted(&self, policy: RecoveryPolicy) -> Result<usize, StoreError>;

    /// Delete terminal jobs completed before `before_ms`. Housekeeping only.
    fn purge_terminal(&self, before_ms: u64) -> Result<usize, StoreError>;
}
