//! HTTP load-testing engine: runs timed or capped trials at increasing concurrency,
//! measures throughput and latency, picks the best level and compares saved results.

pub mod bench;
pub mod compare;
pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod report;
pub mod scheduler;
pub mod snapshot;
pub mod substitute;
pub mod transport;
