use std::time::Instant;

use crate::{
    bench::{BenchEngine, TrialParameters, TrialResult},
    error::{BenchError, ConfigError},
    logging::BenchLogger,
    process::{ProcessSampler, ProcessUsage},
};

/// Outcome of one trial plus the resource figures of the process under test, if any.
#[derive(Debug, Clone)]
pub struct TrialReport {
    pub result: TrialResult,
    pub process: Option<ProcessUsage>,
}

/// Runs trials one after another so measurements stay attributable to a single level.
pub struct TrialScheduler<'a> {
    engine: &'a BenchEngine,
    sampler: Option<&'a dyn ProcessSampler>,
}

impl<'a> TrialScheduler<'a> {
    pub fn new(engine: &'a BenchEngine) -> Self {
        Self {
            engine,
            sampler: None,
        }
    }

    pub fn with_sampler(mut self, sampler: &'a dyn ProcessSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// One trial per level, in order. `on_trial` sees every report as soon as it completes.
    pub async fn run_all<F>(
        &self,
        levels: &[usize],
        base: &TrialParameters,
        mut on_trial: F,
    ) -> Result<Vec<TrialReport>, BenchError>
    where
        F: FnMut(&TrialReport),
    {
        if levels.is_empty() {
            return Err(ConfigError::NoLevels.into());
        }
        // Reject every bad level before the first trial starts.
        for &level in levels {
            base.with_concurrency(level).validate()?;
        }

        let mut reports = Vec::with_capacity(levels.len());
        for &level in levels {
            let report = self.run_trial(&base.with_concurrency(level)).await?;
            on_trial(&report);
            reports.push(report);
        }
        Ok(reports)
    }

    async fn run_trial(&self, params: &TrialParameters) -> Result<TrialReport, BenchError> {
        let target = self.sampler.zip(params.process_name.as_deref());
        let before = target.and_then(|(sampler, name)| match sampler.sample(name) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                BenchLogger::process_sample_failed("before", name, &err);
                None
            }
        });

        let started = Instant::now();
        let result = self.engine.run(params).await?;
        let elapsed = started.elapsed();

        let process = target.and_then(|(sampler, name)| match sampler.sample(name) {
            Ok(after) => Some(ProcessUsage::between(before.as_ref(), &after, elapsed)),
            Err(err) => {
                BenchLogger::process_sample_failed("after", name, &err);
                None
            }
        });

        Ok(TrialReport { result, process })
    }
}

/// Ranking score `rps / log10(mean latency in ns)`.
///
/// A heuristic, not an optimum: latency is penalised logarithmically, so the pick leans
/// toward higher concurrency until latency grows by orders of magnitude. `None` for
/// trials that cannot be ranked (no latency data, latency of 1ns or less, zero rps).
pub fn score(result: &TrialResult) -> Option<f64> {
    let latency_ns = result.mean_latency()?.as_nanos() as f64;
    if latency_ns <= 1.0 || !(result.rps > 0.0) {
        return None;
    }
    let score = result.rps / latency_ns.log10();
    score.is_finite().then_some(score)
}

/// Highest scoring trial; ties go to the earlier one.
pub fn select_best<'r, I>(results: I) -> Result<&'r TrialResult, BenchError>
where
    I: IntoIterator<Item = &'r TrialResult>,
{
    let mut best: Option<(&TrialResult, f64)> = None;
    for result in results {
        let Some(candidate) = score(result) else {
            continue;
        };
        if best.map_or(true, |(_, top)| candidate > top) {
            best = Some((result, candidate));
        }
    }
    best.map(|(result, _)| result)
        .ok_or(BenchError::DegenerateMetric)
}
