use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use docq::http;
use docq::queue::{
    handler_fn, JobContext, JobError, QueueConfig, QueueManager, SqliteConfig,
};
use docq::telemetry;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const DEFAULT_HTTP_PORT: u16 = 6790;

/// Resolves once Ctrl+C or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler, continuing without it");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, continuing without it");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}

/// Create QueueManager based on configuration.
fn create_queue_manager(config: QueueConfig) -> Result<Arc<QueueManager>, Box<dyn std::error::Error>> {
    let in_memory = std::env::var("IN_MEMORY")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let qm = if in_memory {
        info!("Running in-memory mode (no persistence)");
        QueueManager::in_memory(config)
    } else {
        let sqlite = SqliteConfig::from_env();
        info!(path = %sqlite.path.display(), "Using SQLite persistence");
        QueueManager::with_sqlite(sqlite, config)?
    };
    Ok(Arc::new(qm))
}

/// Built-in handlers for smoke testing.
fn register_builtin_handlers(qm: &QueueManager) {
    // Returns its payload unchanged.
    qm.register_handler(
        "echo",
        handler_fn(|payload: Value, _ctx: JobContext| async move { Ok(payload) }),
    );

    // Sleeps `duration_ms` in ten steps, reporting progress and honouring cancel.
    qm.register_handler(
        "sleep",
        handler_fn(|payload: Value, ctx: JobContext| async move {
            let total = payload
                .get("duration_ms")
                .and_then(Value::as_u64)
                .ok_or_else(|| JobError::failed("payload.duration_ms must be an integer"))?;
            let step = Duration::from_millis(total / 10);
            for i in 1..=10u8 {
                ctx.checkpoint()?;
                tokio::time::sleep(step).await;
                ctx.report_progress(i * 10);
            }
            Ok::<_, JobError>(json!({ "slept_ms": total }))
        }),
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();

    let config = QueueConfig::from_env();
    let queue_manager = create_queue_manager(config)?;

    register_builtin_handlers(&queue_manager);
    queue_manager.recover_interrupted()?;
    queue_manager.start();

    let http_port = std::env::var("HTTP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .filter(|p: &u16| *p != 0)
        .unwrap_or(DEFAULT_HTTP_PORT);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", http_port)).await?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = http_port,
        endpoint = %format!("http://0.0.0.0:{}", http_port),
        "docq ready"
    );

    let router = http::create_router(Arc::clone(&queue_manager));
    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "HTTP server error");
    }

    let shutdown_timeout = queue_manager.config().shutdown_timeout;
    if !queue_manager.stop(true, Some(shutdown_timeout)).await {
        warn!(timeout_secs = shutdown_timeout.as_secs(), "Some jobs were still running at exit");
    }
    info!("Shutdown complete");
    Ok(())
}
