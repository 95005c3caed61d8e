//! In-process job store.
//!
//! A single mutex guards both the record map and the pending priority index,
//! so claim, finish and cancel are mutually exclusive exactly like the
//! SQLite store's single-statement updates. Nothing survives a restart.

use parking_lot::Mutex;

use crate::protocol::{CancelOutcome, FinishOutcome, Job, JobOutcome, JobStats, JobStatus};

use super::config::RecoveryPolicy;
use super::error::StoreError;
use super::storage::{JobStore, INTERRUPTED_ERROR};
use super::types::{now_ms, FxHashMap, IndexedPriorityQueue};

/// Compact the pending heap once lazy removals exceed this many entries.
const COMPACT_THRESHOLD: usize = 1024;

#[derive(Default)]
struct Inner {
    jobs: FxHashMap<String, Job>,
    pending: IndexedPriorityQueue,
    next_seq: u64,
    stale: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn insert(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::DuplicateId(job.id.clone()));
        }
        inner.next_seq += 1;
        let mut job = job.clone();
        job.seq = inner.next_seq;
        job.status = JobStatus::Pending;
        inner
            .pending
            .push(&job.id, job.priority, job.created_at, job.seq);
        inner.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn claim_next_up_to(&self, max_seq: u64) -> Result<Option<Job>, StoreError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut deferred = Vec::new();
        let mut claimed = None;

        while let Some(id) = inner.pending.pop() {
            let Some(job) = inner.jobs.get_mut(&id) else {
                continue;
            };
            if job.status != JobStatus::Pending {
                continue;
            }
            if job.seq > max_seq {
                deferred.push((id, job.priority, job.created_at, job.seq));
                continue;
            }
            job.status = JobStatus::Processing;
            job.started_at = Some(now_ms());
            job.progress = 0;
            claimed = Some(job.clone());
            break;
        }

        for (id, priority, created_at, seq) in deferred {
            inner.pending.push(&id, priority, created_at, seq);
        }
        Ok(claimed)
    }

    fn last_seq(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().next_seq)
    }

    fn update_progress(&self, id: &str, percent: u8) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        match inner.jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Processing => {
                job.progress = job.progress.max(percent.min(100));
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn finish(&self, id: &str, outcome: JobOutcome) -> Result<FinishOutcome, StoreError> {
        let mut inner = self.inner.lock();
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if job.status != JobStatus::Processing {
            return Ok(FinishOutcome::Conflict(job.status));
        }

        job.completed_at = Some(now_ms());
        job.status = match outcome {
            _ if job.cancel_requested => JobStatus::Cancelled,
            JobOutcome::Cancelled => JobStatus::Cancelled,
            JobOutcome::Completed(result) => {
                job.result = Some(result);
                JobStatus::Completed
            }
            JobOutcome::Failed(error) => {
                job.error = Some(error);
                JobStatus::Failed
            }
        };
        Ok(FinishOutcome::Recorded(job.status))
    }

    fn request_cancel(&self, id: &str) -> Result<CancelOutcome, StoreError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        match job.status {
            JobStatus::Pending => {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(now_ms());
                if inner.pending.remove(id) {
                    inner.stale += 1;
                }
                if inner.stale >= COMPACT_THRESHOLD {
                    inner.pending.compact();
                    inner.stale = 0;
                }
                Ok(CancelOutcome::Cancelled)
            }
            JobStatus::Processing => {
                job.cancel_requested = true;
                Ok(CancelOutcome::Requested)
            }
            status => Ok(CancelOutcome::AlreadyTerminal(status)),
        }
    }

    fn is_cancel_requested(&self, id: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .jobs
            .get(id)
            .is_some_and(|job| job.cancel_requested || job.status == JobStatus::Cancelled))
    }

    fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.lock().jobs.get(id).cloned())
    }

    fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock();
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        jobs.truncate(limit);
        Ok(jobs)
    }

    fn stats(&self) -> Result<JobStats, StoreError> {
        let inner = self.inner.lock();
        let mut stats = JobStats::default();
        for job in inner.jobs.values() {
            stats.record(job.status, 1);
        }
        Ok(stats)
    }

    fn recover_interrupted(&self, policy: RecoveryPolicy) -> Result<usize, StoreError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = now_ms();
        let mut touched = 0;

        for job in inner.jobs.values_mut() {
            if job.status != JobStatus::Processing {
                continue;
            }
            touched += 1;
            if job.cancel_requested {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(now);
                continue;
            }
            match policy {
                RecoveryPolicy::Requeue => {
                    job.status = JobStatus::Pending;
                    job.started_at = None;
                    job.progress = 0;
                    inner
                        .pending
                        .push(&job.id, job.priority, job.created_at, job.seq);
                }
                RecoveryPolicy::Fail => {
                    job.status = JobStatus::Failed;
                    job.error = Some(INTERRUPTED_ERROR.to_string());
                    job.completed_at = Some(now);
                }
            }
        }
        Ok(touched)
    }

    fn purge_terminal(&self, before_ms: u64) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let before = inner.jobs.len();
        inner.jobs.retain(|_, job| {
            !(job.is_terminal() && job.completed_at.is_some_and(|at| at < before_ms))
        });
        Ok(before - inner.jobs.len())
    }
}
