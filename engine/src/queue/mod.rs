//! Queue module - durable job queue with a fixed-size worker pool.
//!
//! ## Module Organization
//!
//! - `manager.rs` - QueueManager facade (submit, cancel, query, start/stop)
//! - `storage.rs` - `JobStore` trait shared by the backends
//! - `memory.rs` - In-memory backend over an IndexedPriorityQueue
//! - `sqlite/` - SQLite backend with migrations
//! - `registry.rs` - Job type -> handler mapping, `JobContext`
//! - `worker.rs` - Worker loop and pool lifecycle
//! - `validation.rs` - Input validation and size limits
//! - `types/` - IndexedPriorityQueue, time helpers

mod config;
mod error;
mod manager;
mod memory;
mod registry;
pub mod sqlite;
mod storage;
pub mod types;
mod validation;
mod worker;

#[cfg(test)]
mod tests;

pub use config::{QueueConfig, RecoveryPolicy};
pub use error::{JobError, QueueError, StoreError};
pub use manager::{QueueManager, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
pub use memory::MemoryStore;
pub use registry::{handler_fn, FnHandler, HandlerRegistry, JobContext, JobHandler};
pub use sqlite::{SqliteConfig, SqliteStore};
pub use storage::{JobStore, INTERRUPTED_ERROR};
pub use validation::MAX_JOB_TYPE_LENGTH;
pub use worker::WorkerState;
