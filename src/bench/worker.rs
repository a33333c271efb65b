use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use governor::DefaultDirectRateLimiter;
use tokio_util::sync::CancellationToken;

use super::{accumulator::WorkerAccumulator, limiter::Pacer, params::TrialParameters};
use crate::{
    logging::BenchLogger,
    substitute::Substituter,
    transport::{RenderedRequest, Transport},
};

/// Shared handles of one trial, cloned into every worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub params: Arc<TrialParameters>,
    pub transport: Arc<dyn Transport>,
    pub substituter: Substituter,
    /// Stops new requests. Fired by the request cap, or by `abort`.
    pub stop: CancellationToken,
    /// Stops new requests and abandons in-flight ones. Fired by the deadline.
    pub abort: CancellationToken,
    /// Requests issued so far, used only when the trial is capped.
    pub issued: Arc<AtomicU64>,
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl WorkerContext {
    /// Claims one slot of the request budget. `false` once the budget is spent.
    fn claim(&self, worker: usize) -> bool {
        let cap = self.params.request_cap;
        if cap == 0 {
            return true;
        }
        let issued = self.issued.fetch_add(1, Ordering::AcqRel) + 1;
        if issued > cap {
            if !self.stop.is_cancelled() {
                BenchLogger::request_cap_reached(worker, cap);
            }
            self.stop.cancel();
            return false;
        }
        true
    }
}

pub(crate) async fn run_worker(
    id: usize,
    ctx: WorkerContext,
    mut acc: WorkerAccumulator,
) -> WorkerAccumulator {
    let params = Arc::clone(&ctx.params);
    let mut pacer = Pacer::for_worker(&params, ctx.limiter.as_ref());
    let default_content_type = !params.has_content_type();

    loop {
        if ctx.stop.is_cancelled() {
            break;
        }
        tokio::select! {
            biased;
            _ = ctx.stop.cancelled() => break,
            _ = pacer.ready() => {}
        }
        if !ctx.claim(id) {
            break;
        }

        let request = RenderedRequest {
            method: &params.method,
            url: ctx.substituter.render(&params.url),
            body: ctx.substituter.render(&params.body),
            headers: &params.headers,
            default_content_type,
        };
        if params.verbose {
            BenchLogger::request_trace(id, &request);
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = ctx.abort.cancelled() => break,
            outcome = ctx.transport.execute(&request) => outcome,
        };
        let elapsed = started.elapsed();

        if !request.body.is_empty() {
            acc.record_request_body(request.body.len());
        }
        match outcome {
            Ok(response) => {
                if params.verbose {
                    BenchLogger::response_trace(id, &response, elapsed);
                }
                acc.record_response(response.status, elapsed, response.body.len());
            }
            Err(err) => {
                if params.verbose {
                    BenchLogger::failure_trace(id, &err, elapsed);
                }
                BenchLogger::transport_error(id, &err);
                acc.record_transport_error();
            }
        }
    }

    acc
}
