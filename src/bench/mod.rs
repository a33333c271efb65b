pub mod accumulator;
pub mod limiter;
pub mod params;
pub mod result;
pub(crate) mod worker;

use std::{
    sync::{atomic::AtomicU64, Arc},
    time::Instant,
};

use futures::future::join_all;
use tokio::time::sleep_until;
use tokio_util::sync::CancellationToken;

pub use accumulator::WorkerAccumulator;
pub use params::{RateMode, TrialParameters};
pub use result::{LatencySummary, TrialResult};

use crate::{
    error::BenchError, logging::BenchLogger, substitute::Substituter, transport::Transport,
};
use worker::{run_worker, WorkerContext};

/// Runs one trial at a time against an injected transport.
///
/// The substituter, and with it every `__SEQ_..__` counter, lives as long as the engine,
/// so sequences continue across the trials of a run.
#[derive(Clone)]
pub struct BenchEngine {
    transport: Arc<dyn Transport>,
    substituter: Substituter,
}

impl BenchEngine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            substituter: Substituter::new(),
        }
    }

    pub fn with_substituter(mut self, substituter: Substituter) -> Self {
        self.substituter = substituter;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub async fn run(&self, params: &TrialParameters) -> Result<TrialResult, BenchError> {
        params.validate()?;
        BenchLogger::trial_started(params.concurrency, params.duration, params.request_cap);

        let accumulators = (0..params.concurrency)
            .map(|_| WorkerAccumulator::new())
            .collect::<Result<Vec<_>, _>>()?;
        let mut total = WorkerAccumulator::new()?;

        let abort = CancellationToken::new();
        let ctx = WorkerContext {
            params: Arc::new(params.clone()),
            transport: Arc::clone(&self.transport),
            substituter: self.substituter.clone(),
            stop: abort.child_token(),
            abort: abort.clone(),
            issued: Arc::new(AtomicU64::new(0)),
            limiter: limiter::shared_limiter(params),
        };

        let started = Instant::now();
        let handles: Vec<_> = accumulators
            .into_iter()
            .enumerate()
            .map(|(id, acc)| tokio::spawn(run_worker(id, ctx.clone(), acc)))
            .collect();
        drop(ctx);

        let workers = join_all(handles);
        tokio::pin!(workers);
        let finished = if params.duration.is_zero() {
            workers.await
        } else {
            let deadline = tokio::time::Instant::from_std(started + params.duration);
            tokio::select! {
                finished = &mut workers => finished,
                _ = sleep_until(deadline) => {
                    abort.cancel();
                    workers.await
                }
            }
        };
        let elapsed = started.elapsed();
        abort.cancel();

        for partial in finished {
            total = total.merge(partial?)?;
        }
        BenchLogger::trial_finished(params.concurrency, elapsed, total.total());

        Ok(TrialResult::compute(params.clone(), total, elapsed))
    }
}
