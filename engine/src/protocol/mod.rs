//! Wire and domain types shared by the queue, workers and HTTP API.

mod types;

pub use types::{
    CancelOutcome, FinishOutcome, Job, JobOutcome, JobStats, JobStatus, JobView,
};
