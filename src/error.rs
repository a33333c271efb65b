use std::path::PathBuf;

use hdrhistogram::errors::{AdditionError, CreationError};

/// Invalid trial or transport settings. Always detected before any worker starts.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Concurrency must be at least 1 (got {0})")]
    Concurrency(usize),
    #[error("Duration must be positive when no request cap is set")]
    Duration,
    #[error("Invalid duration '{0}'")]
    DurationFormat(String),
    #[error("Target rps must be 0 or a finite rate with a representable period (got {0})")]
    TargetRps(f64),
    #[error("Invalid http method '{0}'")]
    Method(String),
    #[error("Unsupported http version: {0}")]
    HttpVersion(String),
    #[error("Unknown rate mode '{0}' (expected aggregate|per-worker)")]
    RateMode(String),
    #[error("No target url given")]
    MissingUrl,
    #[error("No concurrency levels given")]
    NoLevels,
    #[error("Failed to build http client - {0}")]
    Client(#[source] reqwest::Error),
}

/// Snapshot or report I/O failure. Never invalidates an already computed result.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("Could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not decode snapshot {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Could not encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Could not write comparison report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("No trial produced usable throughput and latency figures to rank")]
    DegenerateMetric,
    #[error("Latency histogram could not be created - {0}")]
    Histogram(#[from] CreationError),
    #[error("Latency histograms could not be merged - {0}")]
    Merge(#[from] AdditionError),
    #[error("Worker task failed - {0}")]
    Worker(#[from] tokio::task::JoinError),
}
