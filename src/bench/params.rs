use std::{fmt, str::FromStr, time::Duration};

use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::limiter::representable_rate;
use crate::{error::ConfigError, logging::BenchLogger};

/// How `target_rps` is enforced across the workers of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateMode {
    /// One limiter shared by all workers; `target_rps` caps the trial as a whole.
    #[default]
    Aggregate,
    /// Every worker ticks on its own `1/target_rps` timer, so the trial can reach
    /// `concurrency * target_rps`.
    PerWorker,
}

impl FromStr for RateMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aggregate" => Ok(Self::Aggregate),
            "per-worker" | "per_worker" | "worker" => Ok(Self::PerWorker),
            other => Err(ConfigError::RateMode(other.to_string())),
        }
    }
}

impl fmt::Display for RateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate => f.write_str("aggregate"),
            Self::PerWorker => f.write_str("per-worker"),
        }
    }
}

/// Immutable configuration of a single trial.
#[derive(Debug, Clone)]
pub struct TrialParameters {
    /// URL template, placeholders expanded per request.
    pub url: String,
    pub method: Method,
    /// Body template; empty means no body.
    pub body: String,
    pub headers: Vec<(String, String)>,
    /// Number of parallel workers.
    pub concurrency: usize,
    /// Wall-clock budget; zero is only valid together with `request_cap`.
    pub duration: Duration,
    /// Global request budget, 0 = unbounded.
    pub request_cap: u64,
    /// Requests per second, 0 = unbounded.
    pub target_rps: f64,
    pub rate_mode: RateMode,
    pub verbose: bool,
    /// Process sampled before and after the trial.
    pub process_name: Option<String>,
}

impl TrialParameters {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            body: String::new(),
            headers: Vec::new(),
            concurrency: 1,
            duration: Duration::from_secs(1),
            request_cap: 0,
            target_rps: 0.0,
            rate_mode: RateMode::default(),
            verbose: false,
            process_name: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if self.concurrency < 1 {
            return Err(ConfigError::Concurrency(self.concurrency));
        }
        if self.duration.is_zero() && self.request_cap == 0 {
            return Err(ConfigError::Duration);
        }
        if !self.target_rps.is_finite()
            || self.target_rps < 0.0
            || !representable_rate(self.target_rps)
        {
            return Err(ConfigError::TargetRps(self.target_rps));
        }
        Ok(())
    }

    /// Same trial at another concurrency level.
    pub fn with_concurrency(&self, concurrency: usize) -> Self {
        Self {
            concurrency,
            ..self.clone()
        }
    }

    pub fn has_content_type(&self) -> bool {
        self.headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
    }
}

pub fn parse_method(raw: &str) -> Result<Method, ConfigError> {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(upper.as_bytes()).map_err(|_| ConfigError::Method(raw.to_string()))
}

/// Splits `Name: value` on the first colon. Malformed lines are skipped with a warning.
pub fn parse_headers<I, S>(lines: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| {
            let line = line.as_ref();
            match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    Some((name.trim().to_string(), value.trim().to_string()))
                }
                _ => {
                    BenchLogger::malformed_header(line);
                    None
                }
            }
        })
        .collect()
}
