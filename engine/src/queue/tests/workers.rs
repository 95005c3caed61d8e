//! Worker pool tests: dispatch failures, progress, lifecycle, shutdown.

use tokio::sync::Barrier;

use super::*;

fn echo() -> Arc<dyn JobHandler> {
    handler_fn(|payload: Value, _ctx: JobContext| async move { Ok(payload) })
}

fn sleeper(duration: Duration) -> Arc<dyn JobHandler> {
    handler_fn(move |_payload: Value, _ctx: JobContext| async move {
        tokio::time::sleep(duration).await;
        Ok(json!({"slept_ms": duration.as_millis() as u64}))
    })
}

#[tokio::test]
async fn test_unknown_type_fails_without_blocking() {
    let qm = setup();
    qm.register_handler("known", echo());

    let unknown = qm.submit("unknown", json!({}), 10).unwrap();
    let known = qm.submit("known", json!({"ok": true}), 0).unwrap();
    qm.start();

    let failed = wait_for_status(&qm, &unknown, JobStatus::Failed, Duration::from_secs(2)).await;
    assert!(failed.error.unwrap().contains("unknown"));
    wait_for_status(&qm, &known, JobStatus::Completed, Duration::from_secs(2)).await;

    qm.stop(true, Some(Duration::from_secs(1))).await;
}

#[tokio::test]
async fn test_handler_error_marks_failed() {
    let qm = setup();
    qm.register_handler(
        "bad",
        handler_fn(|_payload: Value, _ctx: JobContext| async move {
            Err::<Value, _>(JobError::failed("file not found: /docs/missing.pdf"))
        }),
    );
    qm.start();

    let id = qm.submit("bad", json!({"file_path": "/docs/missing.pdf"}), 0).unwrap();
    let job = wait_for_status(&qm, &id, JobStatus::Failed, Duration::from_secs(2)).await;
    assert_eq!(job.error.as_deref(), Some("file not found: /docs/missing.pdf"));
    assert!(job.result.is_none());
    assert!(job.completed_at.is_some());

    qm.stop(true, Some(Duration::from_secs(1))).await;
}

#[tokio::test]
async fn test_handler_panic_marks_failed_and_worker_survives() {
    let qm = setup();
    qm.register_handler(
        "boom",
        handler_fn(|_payload: Value, _ctx: JobContext| async move {
            if true {
                panic!("corrupt document");
            }
            Ok::<_, JobError>(json!({}))
        }),
    );
    qm.register_handler("echo", echo());
    qm.start();

    let boom = qm.submit("boom", json!({}), 0).unwrap();
    let job = wait_for_status(&qm, &boom, JobStatus::Failed, Duration::from_secs(2)).await;
    assert!(job.error.unwrap().contains("corrupt document"));

    // The single worker is still alive.
    let next = qm.submit("echo", json!({}), 0).unwrap();
    wait_for_status(&qm, &next, JobStatus::Completed, Duration::from_secs(2)).await;

    qm.stop(true, Some(Duration::from_secs(1))).await;
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let qm = setup();
    qm.register_handler(
        "progress",
        handler_fn(|_payload: Value, ctx: JobContext| async move {
            for percent in [10u8, 40, 90, 100] {
                ctx.report_progress(percent);
                tokio::time::sleep(Duration::from_millis(40)).await;
            }
            Ok(json!({}))
        }),
    );
    qm.start();

    let id = qm.submit("progress", json!({}), 0).unwrap();
    let mut seen = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let job = qm.get_job(&id).unwrap();
        seen.push(job.progress);
        if job.status.is_terminal() {
            assert_eq!(job.status, JobStatus::Completed);
            break;
        }
        assert!(Instant::now() < deadline, "job never finished");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", seen);
    assert_eq!(seen.last().copied(), Some(100));
    assert!(seen.iter().any(|p| *p == 40 || *p == 90));

    qm.stop(true, Some(Duration::from_secs(1))).await;
}

#[tokio::test]
async fn test_lower_progress_report_is_ignored() {
    let qm = setup();
    qm.register_handler(
        "regress",
        handler_fn(|_payload: Value, ctx: JobContext| async move {
            ctx.report_progress(60);
            ctx.report_progress(20);
            Ok(json!({}))
        }),
    );
    qm.start();

    let id = qm.submit("regress", json!({}), 0).unwrap();
    let job = wait_for_status(&qm, &id, JobStatus::Completed, Duration::from_secs(2)).await;
    assert_eq!(job.progress, 60);

    qm.stop(true, Some(Duration::from_secs(1))).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_workers_run_jobs_concurrently() {
    let qm = setup_with_workers(2);
    let barrier = Arc::new(Barrier::new(2));
    let gate = barrier.clone();
    qm.register_handler(
        "rendezvous",
        handler_fn(move |_payload: Value, _ctx: JobContext| {
            let gate = Arc::clone(&gate);
            async move {
                // Completes only if both jobs are in flight at once.
                tokio::time::timeout(Duration::from_secs(2), gate.wait())
                    .await
                    .map_err(|_| JobError::failed("ran alone"))?;
                Ok::<_, JobError>(json!({}))
            }
        }),
    );
    qm.start();

    let a = qm.submit("rendezvous", json!({}), 0).unwrap();
    let b = qm.submit("rendezvous", json!({}), 0).unwrap();
    wait_for_status(&qm, &a, JobStatus::Completed, Duration::from_secs(5)).await;
    wait_for_status(&qm, &b, JobStatus::Completed, Duration::from_secs(5)).await;

    qm.stop(true, Some(Duration::from_secs(1))).await;
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let qm = setup_with_workers(3);
    assert!(!qm.is_running());
    assert!(qm.worker_states().is_empty());

    assert!(qm.start());
    assert!(!qm.start());
    assert!(qm.is_running());
    assert_eq!(qm.worker_states().len(), 3);

    assert!(qm.stop(true, Some(Duration::from_secs(2))).await);
    assert!(!qm.is_running());
    // Stopping twice is harmless.
    assert!(qm.stop(true, None).await);
}

#[tokio::test]
async fn test_submit_allowed_before_start() {
    let qm = setup();
    qm.register_handler("echo", echo());
    let id = qm.submit("echo", json!({}), 0).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(qm.get_job(&id).unwrap().status, JobStatus::Pending);

    qm.start();
    wait_for_status(&qm, &id, JobStatus::Completed, Duration::from_secs(2)).await;
    qm.stop(true, Some(Duration::from_secs(1))).await;
}

#[tokio::test]
async fn test_graceful_stop_drains_in_flight_job() {
    let qm = setup();
    qm.register_handler("slow", sleeper(Duration::from_secs(2)));
    qm.start();

    let id = qm.submit("slow", json!({}), 0).unwrap();
    wait_for_status(&qm, &id, JobStatus::Processing, Duration::from_secs(2)).await;

    let started = Instant::now();
    assert!(qm.stop(true, Some(Duration::from_secs(5))).await);
    assert!(started.elapsed() >= Duration::from_millis(1500));

    assert_eq!(qm.get_job(&id).unwrap().status, JobStatus::Completed);
    assert!(qm
        .worker_states()
        .iter()
        .all(|s| *s == WorkerState::Stopped));

    // Nothing is claimed once stopped.
    let after = qm.submit("slow", json!({}), 0).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(qm.get_job(&after).unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn test_graceful_stop_right_after_submit_runs_job() {
    let qm = setup();
    qm.register_handler("slow", sleeper(Duration::from_secs(2)));
    qm.start();

    // No wait for the worker to pick it up first.
    let id = qm.submit("slow", json!({}), 0).unwrap();
    let started = Instant::now();
    assert!(qm.stop(true, Some(Duration::from_secs(5))).await);
    assert!(started.elapsed() >= Duration::from_millis(1500));

    let job = qm.get_job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result, Some(json!({"slept_ms": 2000})));
}

#[tokio::test]
async fn test_graceful_stop_drains_queued_backlog() {
    let qm = setup();
    let log = Arc::new(Mutex::new(Vec::new()));
    qm.register_handler("record", recording_handler(Arc::clone(&log)));

    let ids: Vec<String> = (0..4)
        .map(|i| qm.submit("record", json!({"name": format!("doc{}", i)}), 0).unwrap())
        .collect();
    qm.start();
    assert!(qm.stop(true, Some(Duration::from_secs(5))).await);

    for id in &ids {
        assert_eq!(qm.get_job(id).unwrap().status, JobStatus::Completed);
    }
    assert_eq!(log.lock().len(), 4);
}

#[tokio::test]
async fn test_graceful_stop_ignores_jobs_submitted_during_drain() {
    let qm = Arc::new(setup());
    qm.register_handler("slow", sleeper(Duration::from_millis(300)));
    qm.start();

    let first = qm.submit("slow", json!({}), 0).unwrap();
    let stopping = {
        let qm = Arc::clone(&qm);
        tokio::spawn(async move { qm.stop(true, Some(Duration::from_secs(5))).await })
    };
    wait_for_status(&qm, &first, JobStatus::Processing, Duration::from_secs(2)).await;
    let late = qm.submit("slow", json!({}), 10).unwrap();

    assert!(stopping.await.unwrap());
    assert_eq!(qm.get_job(&first).unwrap().status, JobStatus::Completed);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(qm.get_job(&late).unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn test_graceful_stop_times_out() {
    let qm = setup();
    qm.register_handler("slow", sleeper(Duration::from_secs(2)));
    qm.start();

    let id = qm.submit("slow", json!({}), 0).unwrap();
    wait_for_status(&qm, &id, JobStatus::Processing, Duration::from_secs(2)).await;

    let started = Instant::now();
    assert!(!qm.stop(true, Some(Duration::from_millis(100))).await);
    assert!(started.elapsed() < Duration::from_secs(1));

    // The detached job still records its outcome.
    wait_for_status(&qm, &id, JobStatus::Completed, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_immediate_stop_returns_without_waiting() {
    let qm = setup();
    qm.register_handler("slow", sleeper(Duration::from_secs(2)));
    qm.start();

    let id = qm.submit("slow", json!({}), 0).unwrap();
    wait_for_status(&qm, &id, JobStatus::Processing, Duration::from_secs(2)).await;

    let started = Instant::now();
    assert!(!qm.stop(false, None).await);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(!qm.is_running());
}

#[tokio::test]
async fn test_idle_workers_stop_promptly() {
    let config = fast_config(2).with_poll_interval(Duration::from_secs(30));
    let qm = QueueManager::in_memory(config);
    qm.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(qm
        .worker_states()
        .iter()
        .all(|s| *s == WorkerState::Idle));

    let started = Instant::now();
    assert!(qm.stop(true, Some(Duration::from_secs(5))).await);
    assert!(started.elapsed() < Duration::from_secs(1));
}
