//! QueueManager tests: submission, ordering, cancellation, worker lifecycle.

mod priority;
mod workers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::*;
use crate::protocol::{CancelOutcome, JobStats, JobStatus, JobView};

fn fast_config(workers: usize) -> QueueConfig {
    let mut config = QueueConfig::default()
        .with_workers(workers)
        .with_poll_interval(Duration::from_millis(20));
    config.store_retry_base = Duration::from_millis(1);
    config
}

fn setup() -> QueueManager {
    QueueManager::in_memory(fast_config(1))
}

fn setup_with_workers(workers: usize) -> QueueManager {
    QueueManager::in_memory(fast_config(workers))
}

/// Poll until `id` reaches `status`; panics after `within`.
async fn wait_for_status(qm: &QueueManager, id: &str, status: JobStatus, within: Duration) -> JobView {
    let deadline = Instant::now() + within;
    loop {
        let job = qm.get_job(id).unwrap();
        if job.status == status {
            return job;
        }
        assert!(
            Instant::now() < deadline,
            "job {} stuck in {} waiting for {}",
            id,
            job.status,
            status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until `cond` holds; returns false on timeout.
async fn wait_until(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Handler that appends `payload.name` to a shared log and completes.
fn recording_handler(log: Arc<Mutex<Vec<String>>>) -> Arc<dyn JobHandler> {
    handler_fn(move |payload: Value, _ctx: JobContext| {
        let log = Arc::clone(&log);
        async move {
            let name = payload["name"].as_str().unwrap_or_default().to_string();
            log.lock().push(name.clone());
            Ok(json!({ "name": name }))
        }
    })
}
