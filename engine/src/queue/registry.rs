//! Handler registry: maps a job type to the collaborator that executes it.
//!
//! Handlers never see the store. They get a copy of the payload and a
//! `JobContext` that can only report progress and observe cancellation.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{info, warn};

use super::error::{JobError, QueueError};
use super::types::FxHashMap;

/// External collaborator executing one job type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, payload: Value, ctx: JobContext) -> Result<Value, JobError>;
}

/// Worker-side sink behind a `JobContext`.
pub(crate) trait ProgressSink: Send + Sync {
    fn report(&self, job_id: &str, percent: u8);
    fn cancel_requested(&self, job_id: &str) -> bool;
}

/// Sink for contexts not attached to a worker.
struct NoopSink;

impl ProgressSink for NoopSink {
    fn report(&self, _job_id: &str, _percent: u8) {}

    fn cancel_requested(&self, _job_id: &str) -> bool {
        false
    }
}

/// Capability handed to a running handler.
#[derive(Clone)]
pub struct JobContext {
    job_id: Arc<str>,
    sink: Arc<dyn ProgressSink>,
}

impl JobContext {
    pub(crate) fn new(job_id: &str, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            job_id: Arc::from(job_id),
            sink,
        }
    }

    /// Context that records nothing and is never cancelled. Handy for
    /// calling a handler directly.
    pub fn detached(job_id: &str) -> Self {
        Self::new(job_id, Arc::new(NoopSink))
    }

    #[inline]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Best-effort progress report (0-100). Lower values than the last
    /// report are ignored by the store.
    pub fn report_progress(&self, percent: u8) {
        self.sink.report(&self.job_id, percent.min(100));
    }

    /// Whether a caller asked to cancel this job.
    pub fn is_cancelled(&self) -> bool {
        self.sink.cancel_requested(&self.job_id)
    }

    /// Cooperative cancellation point: `Err(JobError::Cancelled)` once a
    /// cancel was requested, so handlers can `ctx.checkpoint()?`.
    pub fn checkpoint(&self) -> Result<(), JobError> {
        if self.is_cancelled() {
            Err(JobError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Adapter so plain async closures can be registered.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Value, JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, JobError>> + Send + 'static,
{
    async fn execute(&self, payload: Value, ctx: JobContext) -> Result<Value, JobError> {
        (self.0)(payload, ctx).await
    }
}

/// Wrap an async closure as a `JobHandler`.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(Value, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, JobError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<FxHashMap<String, Arc<dyn JobHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Re-registering a type replaces the old handler.
    pub fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        let replaced = self
            .handlers
            .write()
            .insert(job_type.clone(), handler)
            .is_some();
        if replaced {
            warn!(job_type = %job_type, "Handler replaced");
        } else {
            info!(job_type = %job_type, "Registered handler");
        }
    }

    pub fn resolve(&self, job_type: &str) -> Result<Arc<dyn JobHandler>, QueueError> {
        self.handlers
            .read()
            .get(job_type)
            .cloned()
            .ok_or_else(|| QueueError::UnknownJobType(job_type.to_string()))
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.read().contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Echo;

    #[async_trait]
    impl JobHandler for Echo {
        async fn execute(&self, payload: Value, _ctx: JobContext) -> Result<Value, JobError> {
            Ok(payload)
        }
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let registry = HandlerRegistry::new();
        registry.register("echo", Arc::new(Echo));

        let handler = registry.resolve("echo").unwrap();
        let out = handler
            .execute(json!({"x": 1}), JobContext::detached("j1"))
            .await
            .unwrap();
        assert_eq!(out, json!({"x": 1}));
        assert!(registry.contains("echo"));
    }

    #[test]
    fn test_unknown_type() {
        let registry = HandlerRegistry::new();
        assert!(matches!(
            registry.resolve("no_such_type"),
            Err(QueueError::UnknownJobType(t)) if t == "no_such_type"
        ));
    }

    #[tokio::test]
    async fn test_reregister_overrides() {
        let registry = HandlerRegistry::new();
        registry.register("t", handler_fn(|_, _| async { Ok(json!("old")) }));
        registry.register("t", handler_fn(|_, _| async { Ok(json!("new")) }));

        let out = registry
            .resolve("t")
            .unwrap()
            .execute(Value::Null, JobContext::detached("j"))
            .await
            .unwrap();
        assert_eq!(out, json!("new"));
        assert_eq!(registry.job_types(), vec!["t".to_string()]);
    }

    struct FlagSink(AtomicBool);

    impl ProgressSink for FlagSink {
        fn report(&self, _job_id: &str, _percent: u8) {}

        fn cancel_requested(&self, _job_id: &str) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_checkpoint_follows_cancel_flag() {
        let sink = Arc::new(FlagSink(AtomicBool::new(false)));
        let ctx = JobContext::new("j", sink.clone());
        assert!(ctx.checkpoint().is_ok());

        sink.0.store(true, Ordering::SeqCst);
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.checkpoint(), Err(JobError::Cancelled)));
    }
}
