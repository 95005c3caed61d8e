//! Worker pool: N tasks looping claim -> execute -> finish.
//!
//! Workers share nothing mutable except the store. Each one runs at most one
//! job at a time; the store's atomic claim keeps two workers off the same job.

use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::protocol::{FinishOutcome, Job, JobOutcome, JobStatus};

use super::config::QueueConfig;
use super::error::{JobError, StoreError};
use super::registry::{HandlerRegistry, JobContext, ProgressSink};
use super::storage::JobStore;

/// Per-worker state as observed from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Claiming,
    Executing,
    Stopping,
    Stopped,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Idle,
            1 => WorkerState::Claiming,
            2 => WorkerState::Executing,
            3 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

/// Shared, read-mostly cell holding a `WorkerState`.
#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    #[inline]
    fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Relaxed))
    }
}

/// What the pool owner wants workers to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopSignal {
    Run,
    /// Keep claiming jobs inserted at or before `up_to`, then exit.
    Drain { up_to: u64 },
    /// Exit after the current job.
    Halt,
}

/// Forwards handler progress and cancel checks to the store.
struct StoreProgress {
    store: Arc<dyn JobStore>,
}

impl ProgressSink for StoreProgress {
    fn report(&self, job_id: &str, percent: u8) {
        match self.store.update_progress(job_id, percent) {
            Ok(true) => debug!(job_id = %job_id, progress = percent, "Progress updated"),
            Ok(false) => debug!(job_id = %job_id, "Progress ignored, job not processing"),
            Err(e) => warn!(job_id = %job_id, error = %e, "Failed to record progress"),
        }
    }

    fn cancel_requested(&self, job_id: &str) -> bool {
        self.store.is_cancel_requested(job_id).unwrap_or_else(|e| {
            warn!(job_id = %job_id, error = %e, "Failed to read cancel flag");
            false
        })
    }
}

struct Worker {
    id: usize,
    store: Arc<dyn JobStore>,
    registry: Arc<HandlerRegistry>,
    config: QueueConfig,
    wakeup: Arc<Notify>,
    stop_rx: watch::Receiver<StopSignal>,
    state: Arc<StateCell>,
}

impl Worker {
    async fn run(mut self) {
        info!(worker = self.id, "Worker started");

        loop {
            let up_to = match self.signal() {
                StopSignal::Run => u64::MAX,
                StopSignal::Drain { up_to } => up_to,
                StopSignal::Halt => {
                    self.state.set(WorkerState::Stopping);
                    break;
                }
            };
            let draining = up_to != u64::MAX;

            self.state.set(WorkerState::Claiming);
            let store = Arc::clone(&self.store);
            match self
                .with_retry("claim_next", || store.claim_next_up_to(up_to))
                .await
            {
                Ok(Some(job)) => {
                    self.state.set(WorkerState::Executing);
                    self.execute(job).await;
                    self.state.set(WorkerState::Idle);
                }
                Ok(None) if draining => {
                    debug!(worker = self.id, up_to, "No jobs left to drain");
                    self.state.set(WorkerState::Stopping);
                    break;
                }
                Ok(None) => {
                    self.state.set(WorkerState::Idle);
                    self.wait_for_work().await;
                }
                Err(e) if draining => {
                    error!(worker = self.id, error = %e, "Claim failed while draining, stopping");
                    self.state.set(WorkerState::Stopping);
                    break;
                }
                Err(e) => {
                    error!(worker = self.id, error = %e, "Claim failed after retries");
                    self.state.set(WorkerState::Idle);
                    self.wait_for_work().await;
                }
            }
        }

        self.state.set(WorkerState::Stopped);
        info!(worker = self.id, "Worker stopped");
    }

    /// Current signal. A dropped sender means the pool owner went away.
    fn signal(&self) -> StopSignal {
        if self.stop_rx.has_changed().is_err() {
            return StopSignal::Halt;
        }
        *self.stop_rx.borrow()
    }

    /// Sleep until a submit wakes us, the poll interval elapses, or stop.
    async fn wait_for_work(&mut self) {
        tokio::select! {
            _ = self.wakeup.notified() => {}
            _ = tokio::time::sleep(self.config.poll_interval) => {}
            _ = self.stop_rx.changed() => {}
        }
    }

    /// Run a store call, retrying transient failures with exponential backoff.
    async fn with_retry<T>(
        &self,
        op: &'static str,
        mut call: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut attempt = 0;
        loop {
            match call() {
                Err(e) if e.is_transient() && attempt < self.config.store_retry_attempts => {
                    attempt += 1;
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        worker = self.id,
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn execute(&self, job: Job) {
        let job_id = job.id.clone();

        let handler = match self.registry.resolve(&job.job_type) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(worker = self.id, job_id = %job_id, job_type = %job.job_type, "No handler registered, failing job");
                self.finish(&job_id, JobOutcome::Failed(e.to_string())).await;
                return;
            }
        };

        info!(
            worker = self.id,
            job_id = %job_id,
            job_type = %job.job_type,
            priority = job.priority,
            "Processing job"
        );

        let ctx = JobContext::new(
            &job_id,
            Arc::new(StoreProgress {
                store: Arc::clone(&self.store),
            }),
        );
        let payload = Arc::unwrap_or_clone(job.payload);

        // Own task so a panicking handler only takes down itself.
        let task = tokio::spawn(async move { handler.execute(payload, ctx).await });

        let outcome = match task.await {
            Ok(Ok(result)) => JobOutcome::Completed(result),
            Ok(Err(JobError::Cancelled)) => {
                info!(worker = self.id, job_id = %job_id, "Handler stopped at cancel checkpoint");
                JobOutcome::Cancelled
            }
            Ok(Err(e)) => {
                warn!(worker = self.id, job_id = %job_id, error = %e, "Handler returned error");
                JobOutcome::Failed(e.to_string())
            }
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                error!(worker = self.id, job_id = %job_id, panic = %message, "Handler panicked");
                JobOutcome::Failed(format!("handler panicked: {}", message))
            }
            Err(join_err) => {
                error!(worker = self.id, job_id = %job_id, error = %join_err, "Handler task aborted");
                JobOutcome::Failed(format!("handler aborted: {}", join_err))
            }
        };

        self.finish(&job_id, outcome).await;
    }

    async fn finish(&self, job_id: &str, outcome: JobOutcome) {
        let store = Arc::clone(&self.store);
        let result = self
            .with_retry("finish", || store.finish(job_id, outcome.clone()))
            .await;

        match result {
            Ok(FinishOutcome::Recorded(JobStatus::Completed)) => {
                info!(worker = self.id, job_id = %job_id, "Job completed")
            }
            Ok(FinishOutcome::Recorded(status)) => {
                info!(worker = self.id, job_id = %job_id, status = %status, "Job finished")
            }
            Ok(FinishOutcome::Conflict(status)) => {
                debug!(worker = self.id, job_id = %job_id, status = %status, "Job no longer processing, outcome dropped")
            }
            Err(e) => {
                error!(worker = self.id, job_id = %job_id, error = %e, "Failed to record job outcome")
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Running set of worker tasks.
pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    stop_tx: watch::Sender<StopSignal>,
}

impl WorkerPool {
    /// Spawn `config.workers` workers on the current tokio runtime.
    pub(crate) fn spawn(
        store: Arc<dyn JobStore>,
        registry: Arc<HandlerRegistry>,
        config: &QueueConfig,
        wakeup: Arc<Notify>,
    ) -> (Self, Vec<Arc<StateCell>>) {
        let (stop_tx, stop_rx) = watch::channel(StopSignal::Run);
        let count = config.workers.max(1);
        let mut handles = Vec::with_capacity(count);
        let mut states = Vec::with_capacity(count);

        for id in 0..count {
            let state = Arc::new(StateCell::default());
            let worker = Worker {
                id,
                store: Arc::clone(&store),
                registry: Arc::clone(&registry),
                config: config.clone(),
                wakeup: Arc::clone(&wakeup),
                stop_rx: stop_rx.clone(),
                state: Arc::clone(&state),
            };
            handles.push(tokio::spawn(worker.run()));
            states.push(state);
        }

        (Self { handles, stop_tx }, states)
    }

    /// Send `signal` to every worker and, when `wait`, wait (bounded by
    /// `timeout`) for them to exit. Returns the handles of workers still
    /// alive afterwards; empty means every worker has exited.
    pub(crate) async fn shutdown(
        self,
        signal: StopSignal,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Vec<JoinHandle<()>> {
        let WorkerPool {
            mut handles,
            stop_tx,
        } = self;

        // Err only means every worker already exited
        let _ = stop_tx.send(signal);

        if wait {
            let drain = async {
                for handle in handles.iter_mut() {
                    if let Err(e) = handle.await {
                        error!(error = %e, "Worker task ended abnormally");
                    }
                }
            };
            match timeout {
                Some(limit) => {
                    let _ = tokio::time::timeout(limit, drain).await;
                }
                None => drain.await,
            }
        }

        // Dropping the sender turns any pending drain into a halt, so
        // workers that outlive the wait stop after their current job.
        drop(stop_tx);
        handles.retain(|h| !h.is_finished());
        handles
    }
}
