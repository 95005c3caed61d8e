//! Type definitions for the docq queue system.
//!
//! Module organization:
//! - `indexed_priority_queue.rs` - O(log n) pending index used by the memory store
//! - `time.rs` - Timestamps, hash type aliases

mod indexed_priority_queue;
mod time;

pub use indexed_priority_queue::IndexedPriorityQueue;
pub use time::{now_ms, FxHashMap};
