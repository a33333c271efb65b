use std::{fmt::Display, sync::LazyLock, time::Duration};

use log::{debug, info, warn};

use crate::transport::{RenderedRequest, TransportResponse};

/// Read once: transport errors are logged on the request path.
static SILENCE_TRANSPORT_ERRORS: LazyLock<bool> =
    LazyLock::new(|| dotenvy::var("DO_NOT_LOG_TRANSPORT_ERROR").is_ok());

pub struct BenchLogger;

impl BenchLogger {
    pub fn trial_started(concurrency: usize, duration: Duration, request_cap: u64) {
        debug!(
            "Starting trial: concurrency={} duration={:?} cap={}",
            concurrency, duration, request_cap
        );
    }

    pub fn trial_finished(concurrency: usize, elapsed: Duration, requests: u64) {
        debug!(
            "Trial finished: concurrency={} elapsed={:?} requests={}",
            concurrency, elapsed, requests
        );
    }

    pub fn request_cap_reached(worker: usize, cap: u64) {
        debug!("Worker {worker} hit the request cap ({cap}), stopping trial");
    }

    pub fn transport_error(worker: usize, err: &dyn Display) {
        if *SILENCE_TRANSPORT_ERRORS {
            return;
        }
        debug!("Worker {worker} request failed: {err}");
    }

    pub fn transport_selected(label: &str) {
        info!("Using {label} transport");
    }

    pub fn fallback_engaged(primary: &str, fallback: &str, err: &dyn Display) {
        warn!("{primary} failed, falling back to {fallback}: {err}");
    }

    pub fn process_sample_failed(stage: &str, name: &str, err: &dyn Display) {
        warn!("Failed to read process stats for '{name}' {stage} benchmark: {err}");
    }

    pub fn malformed_header(line: &str) {
        warn!("Ignoring malformed header '{line}' (expected 'Name: value')");
    }

    pub fn unknown_config_field(key: &str, value: &dyn Display) {
        warn!("Unknown configuration '{key}' with value {value}");
    }

    // ============================================================================
    // Verbose per-request trace
    // ============================================================================

    pub fn request_trace(worker: usize, request: &RenderedRequest<'_>) {
        let mut trace = format!("[w{worker}] > {} {}\n", request.method, request.url);
        for (name, value) in request.headers() {
            trace.push_str(&format!("[w{worker}] > {name}: {value}\n"));
        }
        if !request.body.is_empty() {
            trace.push_str(&format!("[w{worker}] >\n[w{worker}] > {}\n", request.body));
        }
        trace.push_str(&format!("[w{worker}] * Request completely sent off"));
        info!("{trace}");
    }

    pub fn response_trace(worker: usize, response: &TransportResponse, elapsed: Duration) {
        let mut trace = format!("[w{worker}] < {:?} {}\n", response.version, response.status);
        for (name, value) in response.headers.iter() {
            trace.push_str(&format!(
                "[w{worker}] < {name}: {}\n",
                value.to_str().unwrap_or("<binary>")
            ));
        }
        trace.push_str(&format!(
            "[w{worker}] * Connection closed | time: {:?} | bodyRespSize: {} bytes",
            elapsed,
            response.body.len()
        ));
        info!("{trace}");
    }

    pub fn failure_trace(worker: usize, err: &dyn Display, elapsed: Duration) {
        info!("[w{worker}] ! ERR after {elapsed:?}: {err}");
    }
}
