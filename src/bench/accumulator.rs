use std::time::Duration;

use hdrhistogram::{
    errors::{AdditionError, CreationError},
    Histogram,
};

/// Lowest discernible latency, in nanoseconds (1µs).
pub const HISTOGRAM_LOW_NS: u64 = 1_000;
/// Highest trackable latency, in nanoseconds (60s). Larger values are clamped.
pub const HISTOGRAM_HIGH_NS: u64 = 60_000_000_000;
/// Three significant digits keep the relative error at or below 0.1%.
pub const HISTOGRAM_SIGFIG: u8 = 3;

/// Counters owned by a single worker for the length of a trial.
#[derive(Debug, Clone)]
pub struct WorkerAccumulator {
    /// Responses with status in [200, 400).
    pub success: u64,
    /// Responses with any other status.
    pub non_success: u64,
    /// Attempts that never produced a response.
    pub errors: u64,
    pub request_bytes: u64,
    pub response_bytes: u64,
    /// Sum of elapsed time over all obtained responses.
    pub cumulative_latency: Duration,
    pub histogram: Histogram<u64>,
}

impl WorkerAccumulator {
    pub fn new() -> Result<Self, CreationError> {
        Ok(Self {
            success: 0,
            non_success: 0,
            errors: 0,
            request_bytes: 0,
            response_bytes: 0,
            cumulative_latency: Duration::ZERO,
            histogram: Histogram::new_with_bounds(
                HISTOGRAM_LOW_NS,
                HISTOGRAM_HIGH_NS,
                HISTOGRAM_SIGFIG,
            )?,
        })
    }

    /// Requests that produced a response and therefore carry a latency sample.
    pub fn measured(&self) -> u64 {
        self.success + self.non_success
    }

    pub fn total(&self) -> u64 {
        self.measured() + self.errors
    }

    pub fn record_request_body(&mut self, len: usize) {
        self.request_bytes += len as u64;
    }

    pub fn record_response(&mut self, status: u16, elapsed: Duration, body_len: usize) {
        if (200..400).contains(&status) {
            self.success += 1;
            self.response_bytes += body_len as u64;
        } else {
            self.non_success += 1;
        }
        self.cumulative_latency += elapsed;
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.histogram.saturating_record(nanos);
    }

    pub fn record_transport_error(&mut self) {
        self.errors += 1;
    }

    /// Combines two accumulators into one owned total. Order of operands does not matter.
    pub fn merge(mut self, other: Self) -> Result<Self, AdditionError> {
        self.success += other.success;
        self.non_success += other.non_success;
        self.errors += other.errors;
        self.request_bytes += other.request_bytes;
        self.response_bytes += other.response_bytes;
        self.cumulative_latency += other.cumulative_latency;
        self.histogram.add(&other.histogram)?;
        Ok(self)
    }
}
