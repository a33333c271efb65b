use std::{num::NonZeroU32, sync::Arc, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use super::params::{RateMode, TrialParameters};

/// Gap between two permitted requests at `rps`, or `None` when unlimited.
pub fn rate_period(rps: f64) -> Option<Duration> {
    if !rps.is_finite() || rps <= 0.0 {
        return None;
    }
    let period = period_of(rps)?;
    (!period.is_zero()).then_some(period)
}

/// False when `rps` is so small that its period overflows the limiters.
pub fn representable_rate(rps: f64) -> bool {
    rps <= 0.0 || period_of(rps).is_some()
}

fn period_of(rps: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(1.0 / rps)
        .ok()
        .filter(|period| period.as_nanos() <= u128::from(u64::MAX))
}

/// Limiter shared by every worker of an aggregate-rate trial.
pub fn shared_limiter(params: &TrialParameters) -> Option<Arc<DefaultDirectRateLimiter>> {
    if params.rate_mode != RateMode::Aggregate {
        return None;
    }
    let quota = Quota::with_period(rate_period(params.target_rps)?)?.allow_burst(NonZeroU32::MIN);
    Some(Arc::new(RateLimiter::direct(quota)))
}

/// Paces a single worker.
pub enum Pacer {
    Unlimited,
    Shared(Arc<DefaultDirectRateLimiter>),
    Interval(Interval),
}

impl Pacer {
    /// Must be called inside the runtime: per-worker timers start ticking immediately.
    pub fn for_worker(
        params: &TrialParameters,
        shared: Option<&Arc<DefaultDirectRateLimiter>>,
    ) -> Self {
        if let Some(limiter) = shared {
            return Self::Shared(Arc::clone(limiter));
        }
        match (params.rate_mode, rate_period(params.target_rps)) {
            (RateMode::PerWorker, Some(period)) => {
                let mut timer = interval_at(Instant::now() + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Self::Interval(timer)
            }
            _ => Self::Unlimited,
        }
    }

    /// Waits for the next permit. Cancel-safe.
    pub async fn ready(&mut self) {
        match self {
            Self::Unlimited => {}
            Self::Shared(limiter) => limiter.until_ready().await,
            Self::Interval(timer) => {
                timer.tick().await;
            }
        }
    }
}
