//! docq - durable background job queue for document processing.
//!
//! This library exposes the queue engine and its HTTP surface for the binary,
//! benchmarks and tests.

pub mod http;
pub mod protocol;
pub mod queue;
pub mod telemetry;
