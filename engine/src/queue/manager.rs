//! Core QueueManager struct: the public facade over store, registry and pool.
//!
//! Submissions, queries and cancellations are synchronous store calls.
//! `start`/`stop` own the only background execution context.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{CancelOutcome, Job, JobStats, JobStatus, JobView};

use super::config::QueueConfig;
use super::error::{QueueError, StoreError};
use super::memory::MemoryStore;
use super::registry::{HandlerRegistry, JobHandler};
use super::sqlite::{SqliteConfig, SqliteStore};
use super::storage::JobStore;
use super::types::now_ms;
use super::validation::{validate_job_type, validate_payload};
use super::worker::{StateCell, StopSignal, WorkerPool, WorkerState};

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 1000;

pub struct QueueManager {
    store: Arc<dyn JobStore>,
    registry: Arc<HandlerRegistry>,
    config: QueueConfig,
    /// Wakes one idle worker per submit.
    wakeup: Arc<Notify>,
    pool: Mutex<Option<WorkerPool>>,
    /// Workers that outlived a stop timeout, still finishing their job.
    detached: Mutex<Vec<JoinHandle<()>>>,
    worker_states: RwLock<Vec<Arc<StateCell>>>,
}

impl QueueManager {
    /// Create a manager over an existing store.
    pub fn new(store: Arc<dyn JobStore>, config: QueueConfig) -> Self {
        info!(backend = store.name(), workers = config.workers, "Queue manager initialized");
        Self {
            store,
            registry: Arc::new(HandlerRegistry::new()),
            config,
            wakeup: Arc::new(Notify::new()),
            pool: Mutex::new(None),
            detached: Mutex::new(Vec::new()),
            worker_states: RwLock::new(Vec::new()),
        }
    }

    /// Non-durable manager (jobs are lost on restart).
    pub fn in_memory(config: QueueConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Durable manager backed by SQLite.
    pub fn with_sqlite(sqlite: SqliteConfig, config: QueueConfig) -> Result<Self, QueueError> {
        let store = SqliteStore::open(sqlite)?;
        Ok(Self::new(Arc::new(store), config))
    }

    #[inline]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    #[inline]
    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    // ============== Handlers ==============

    /// Register the collaborator for `job_type`. Normally called before
    /// `start()`; a later registration applies to jobs claimed afterwards.
    pub fn register_handler(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.registry.register(job_type, handler);
    }

    pub fn job_types(&self) -> Vec<String> {
        self.registry.job_types()
    }

    // ============== Jobs ==============

    /// Persist a new pending job and return its id without waiting for it
    /// to run. Allowed whether or not the pool is started.
    pub fn submit(&self, job_type: &str, payload: Value, priority: i32) -> Result<String, QueueError> {
        validate_job_type(job_type)?;
        validate_payload(&payload, self.config.max_payload_bytes)?;

        if !self.registry.contains(job_type) {
            debug!(job_type = %job_type, "Submitting job with no registered handler");
        }

        let job = Job::new(job_type, payload, priority);
        self.store.insert(&job)?;
        self.wakeup.notify_one();

        info!(job_id = %job.id, job_type = %job_type, priority, "Job submitted");
        Ok(job.id)
    }

    /// Cancel a job. Pending jobs are cancelled immediately; processing jobs
    /// are flagged for the handler's next checkpoint; terminal jobs are left
    /// untouched.
    pub fn cancel(&self, job_id: &str) -> Result<CancelOutcome, QueueError> {
        let outcome = self.store.request_cancel(job_id).map_err(not_found)?;
        match outcome {
            CancelOutcome::Cancelled => info!(job_id = %job_id, "Job cancelled"),
            CancelOutcome::Requested => info!(job_id = %job_id, "Cancel requested for processing job"),
            CancelOutcome::AlreadyTerminal(status) => {
                debug!(job_id = %job_id, status = %status, "Cancel ignored, job already terminal")
            }
        }
        Ok(outcome)
    }

    pub fn get_job(&self, job_id: &str) -> Result<JobView, QueueError> {
        self.store
            .get(job_id)?
            .map(JobView::from)
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))
    }

    /// Newest-first listing. `limit` is clamped to `MAX_LIST_LIMIT`.
    pub fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<JobView>, QueueError> {
        let jobs = self.store.list(status, limit.min(MAX_LIST_LIMIT))?;
        Ok(jobs.into_iter().map(JobView::from).collect())
    }

    pub fn stats(&self) -> Result<JobStats, QueueError> {
        Ok(self.store.stats()?)
    }

    /// Housekeeping: delete terminal jobs finished more than `age` ago.
    pub fn purge_terminal(&self, age: Duration) -> Result<usize, QueueError> {
        let cutoff = now_ms().saturating_sub(age.as_millis() as u64);
        let purged = self.store.purge_terminal(cutoff)?;
        if purged > 0 {
            info!(count = purged, "Purged terminal jobs");
        }
        Ok(purged)
    }

    /// Resolve jobs a previous process left processing, per the configured
    /// recovery policy. Call before `start()`. Skipped while any worker of
    /// this manager is alive, including ones detached by a stop timeout.
    pub fn recover_interrupted(&self) -> Result<usize, QueueError> {
        if self.is_running() {
            warn!("Recovery skipped, workers already running");
            return Ok(0);
        }
        let detached = self.detached_workers();
        if detached > 0 {
            warn!(workers = detached, "Recovery skipped, detached workers still finishing jobs");
            return Ok(0);
        }
        let recovered = self.store.recover_interrupted(self.config.recovery_policy)?;
        if recovered > 0 {
            info!(count = recovered, policy = ?self.config.recovery_policy, "Recovered interrupted jobs");
        }
        Ok(recovered)
    }

    // ============== Lifecycle ==============

    /// Spawn the worker pool. Idempotent: returns false if already running.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut pool = self.pool.lock();
        if pool.is_some() {
            warn!("Queue manager already running");
            return false;
        }

        let (workers, states) = WorkerPool::spawn(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            &self.config,
            Arc::clone(&self.wakeup),
        );
        *pool = Some(workers);
        *self.worker_states.write() = states;

        info!(workers = self.config.workers.max(1), "Started worker pool");
        true
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.pool.lock().is_some()
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.worker_states.read().iter().map(|s| s.get()).collect()
    }

    /// Workers from an earlier `stop` that are still running a job.
    pub fn detached_workers(&self) -> usize {
        let mut detached = self.detached.lock();
        detached.retain(|h| !h.is_finished());
        detached.len()
    }

    /// Stop the worker pool.
    ///
    /// With `graceful`, workers keep claiming jobs that were submitted before
    /// this call and exit once none are left; jobs submitted afterwards stay
    /// pending. The wait is bounded by `timeout`; workers still busy when it
    /// elapses finish their current job detached and still record its
    /// outcome. Without `graceful`, workers exit after their current job and
    /// the call does not wait.
    ///
    /// Returns true when every worker has exited. No-op (true) if not running.
    pub async fn stop(&self, graceful: bool, timeout: Option<Duration>) -> bool {
        let Some(pool) = self.pool.lock().take() else {
            return true;
        };

        let signal = if graceful {
            match self.store.last_seq() {
                Ok(up_to) => StopSignal::Drain { up_to },
                Err(e) => {
                    warn!(error = %e, "Could not read drain cutoff, stopping after in-flight jobs");
                    StopSignal::Halt
                }
            }
        } else {
            StopSignal::Halt
        };

        info!(
            graceful,
            signal = ?signal,
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "Stopping queue manager..."
        );
        let remaining = pool.shutdown(signal, graceful, timeout).await;
        let drained = remaining.is_empty();

        if drained {
            info!("Queue manager stopped");
        } else {
            if graceful {
                warn!(workers = remaining.len(), "Shutdown timeout elapsed, in-flight jobs continue detached");
            }
            self.detached.lock().extend(remaining);
        }
        drained
    }
}

/// Surface a store-level miss as the caller-facing `NotFound`.
fn not_found(e: StoreError) -> QueueError {
    match e {
        StoreError::NotFound(id) => QueueError::NotFound(id),
        other => QueueError::Store(other),
    }
}
