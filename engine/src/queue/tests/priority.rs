//! Claim ordering: priority DESC, then submission order.

use super::*;
use tempfile::NamedTempFile;

async fn run_priority_order(qm: QueueManager) {
    let log = Arc::new(Mutex::new(Vec::new()));
    qm.register_handler("t", recording_handler(log.clone()));

    let mut ids = Vec::new();
    for (name, priority) in [("a", 5), ("b", 1), ("c", 5), ("d", 10)] {
        ids.push(qm.submit("t", json!({"name": name}), priority).unwrap());
    }

    qm.start();
    for id in &ids {
        wait_for_status(&qm, id, JobStatus::Completed, Duration::from_secs(5)).await;
    }
    qm.stop(true, Some(Duration::from_secs(1))).await;

    assert_eq!(*log.lock(), vec!["d", "a", "c", "b"]);
}

#[tokio::test]
async fn test_priority_order_memory() {
    run_priority_order(setup()).await;
}

#[tokio::test]
async fn test_priority_order_sqlite() {
    let file = NamedTempFile::new().unwrap();
    let qm = QueueManager::with_sqlite(SqliteConfig::with_path(file.path()), fast_config(1)).unwrap();
    run_priority_order(qm).await;
}

#[tokio::test]
async fn test_negative_priority_runs_last() {
    let qm = setup();
    let log = Arc::new(Mutex::new(Vec::new()));
    qm.register_handler("t", recording_handler(log.clone()));

    let low = qm.submit("t", json!({"name": "low"}), -5).unwrap();
    let normal = qm.submit("t", json!({"name": "normal"}), 0).unwrap();

    qm.start();
    wait_for_status(&qm, &low, JobStatus::Completed, Duration::from_secs(5)).await;
    wait_for_status(&qm, &normal, JobStatus::Completed, Duration::from_secs(5)).await;
    qm.stop(true, Some(Duration::from_secs(1))).await;

    assert_eq!(*log.lock(), vec!["normal", "low"]);
}

#[tokio::test]
async fn test_later_high_priority_jumps_queue() {
    let qm = setup();
    let log = Arc::new(Mutex::new(Vec::new()));
    qm.register_handler("t", recording_handler(log.clone()));

    let ids: Vec<String> = (0..3)
        .map(|i| qm.submit("t", json!({"name": format!("bulk-{}", i)}), 0).unwrap())
        .collect();
    let urgent = qm.submit("t", json!({"name": "urgent"}), 100).unwrap();

    qm.start();
    wait_for_status(&qm, &urgent, JobStatus::Completed, Duration::from_secs(5)).await;
    for id in &ids {
        wait_for_status(&qm, id, JobStatus::Completed, Duration::from_secs(5)).await;
    }
    qm.stop(true, Some(Duration::from_secs(1))).await;

    assert_eq!(log.lock()[0], "urgent");
}
