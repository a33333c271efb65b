use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    bench::{LatencySummary, TrialResult},
    error::PersistenceError,
};

/// Flattened, persisted form of one trial. Durations are whole microseconds; latency
/// fields are null when the trial measured no response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proc_name: Option<String>,
    pub url: String,
    pub method: String,
    pub connections: usize,
    pub duration_us: u64,
    #[serde(default)]
    pub rps_limit: f64,
    #[serde(default)]
    pub max_requests: u64,
    pub rps: u64,
    pub latency_us: Option<u64>,
    pub min_us: Option<u64>,
    pub p50_us: Option<u64>,
    pub p90_us: Option<u64>,
    pub p99_us: Option<u64>,
    pub p999_us: Option<u64>,
    pub max_us: Option<u64>,
    pub good: u64,
    pub bad: u64,
    pub error: u64,
    pub body_req_bytes: u64,
    pub body_resp_bytes: u64,
    /// Summed latency of every measured response.
    pub time_us: u64,
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

impl From<&TrialResult> for PersistedSnapshot {
    fn from(result: &TrialResult) -> Self {
        let params = &result.params;
        let stats = &result.stats;
        let latency = result.latency.as_ref();
        let pick = |f: fn(&LatencySummary) -> Duration| latency.map(|l| micros(f(l)));
        Self {
            proc_name: params.process_name.clone(),
            url: params.url.clone(),
            method: params.method.to_string(),
            connections: params.concurrency,
            duration_us: micros(params.duration),
            rps_limit: params.target_rps,
            max_requests: params.request_cap,
            rps: result.rps.round() as u64,
            latency_us: pick(|l| l.mean),
            min_us: pick(|l| l.min),
            p50_us: pick(|l| l.p50),
            p90_us: pick(|l| l.p90),
            p99_us: pick(|l| l.p99),
            p999_us: pick(|l| l.p999),
            max_us: pick(|l| l.max),
            good: stats.success,
            bad: stats.non_success,
            error: stats.errors,
            body_req_bytes: stats.request_bytes,
            body_resp_bytes: stats.response_bytes,
            time_us: micros(stats.cumulative_latency),
        }
    }
}

impl PersistedSnapshot {
    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String, PersistenceError> {
        let mut json = serde_json::to_string_pretty(self).map_err(PersistenceError::Encode)?;
        json.push('\n');
        Ok(json)
    }
}

pub fn read_snapshot(path: &Path) -> Result<PersistedSnapshot, PersistenceError> {
    let raw = fs::read_to_string(path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| PersistenceError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_snapshot(path: &Path, snapshot: &PersistedSnapshot) -> Result<(), PersistenceError> {
    let json = snapshot.to_json()?;
    fs::write(path, json).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}
