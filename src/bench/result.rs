use std::time::Duration;

use super::{accumulator::WorkerAccumulator, params::TrialParameters};

/// Latency figures of a trial. Only exists when at least one response was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub mean: Duration,
    pub min: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    pub p999: Duration,
    pub max: Duration,
}

#[derive(Debug, Clone)]
pub struct TrialResult {
    pub params: TrialParameters,
    pub stats: WorkerAccumulator,
    /// Measured wall-clock span of the trial; zero if unknown.
    pub elapsed: Duration,
    /// Completed attempts (including transport errors) per second.
    pub rps: f64,
    /// `None` means "no data", not "zero latency".
    pub latency: Option<LatencySummary>,
}

impl TrialResult {
    pub fn compute(params: TrialParameters, stats: WorkerAccumulator, elapsed: Duration) -> Self {
        let span = if elapsed.is_zero() {
            params.duration
        } else {
            elapsed
        };
        let rps = if span.is_zero() {
            0.0
        } else {
            stats.total() as f64 / span.as_secs_f64()
        };
        let latency = summarize(&stats);
        Self {
            params,
            stats,
            elapsed,
            rps,
            latency,
        }
    }

    pub fn mean_latency(&self) -> Option<Duration> {
        self.latency.map(|l| l.mean)
    }

    pub fn total_requests(&self) -> u64 {
        self.stats.total()
    }
}

fn summarize(stats: &WorkerAccumulator) -> Option<LatencySummary> {
    let measured = stats.measured();
    if measured == 0 {
        return None;
    }
    let hist = &stats.histogram;
    let at = |q: f64| Duration::from_nanos(hist.value_at_quantile(q));
    let mean_nanos = stats.cumulative_latency.as_nanos() / u128::from(measured);
    Some(LatencySummary {
        mean: Duration::from_nanos(u64::try_from(mean_nanos).unwrap_or(u64::MAX)),
        min: Duration::from_nanos(hist.min()),
        p50: at(0.50),
        p90: at(0.90),
        p99: at(0.99),
        p999: at(0.999),
        max: Duration::from_nanos(hist.max()),
    })
}
