use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use loadscope::{
    bench::{BenchEngine, RateMode, TrialParameters},
    error::{BenchError, ConfigError},
    process::{ProcessSampleError, ProcessSampler, ProcessSnapshot},
    scheduler::{select_best, TrialScheduler},
    transport::{RenderedRequest, Transport, TransportError, TransportResponse},
};

#[derive(Debug, Clone)]
struct Seen {
    url: String,
    body: String,
    headers: Vec<(String, String)>,
}

/// Answers from a script indexed by call number, after an optional delay.
struct Scripted {
    calls: AtomicU64,
    delay: Duration,
    script: fn(u64) -> Result<TransportResponse, TransportError>,
    seen: Mutex<Vec<Seen>>,
}

impl Scripted {
    fn new(script: fn(u64) -> Result<TransportResponse, TransportError>) -> Arc<Self> {
        Self::with_delay(Duration::ZERO, script)
    }

    fn with_delay(
        delay: Duration,
        script: fn(u64) -> Result<TransportResponse, TransportError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU64::new(0),
            delay,
            script,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn ok() -> Arc<Self> {
        Self::new(|_| Ok(TransportResponse::new(200, "ok")))
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for Scripted {
    async fn execute(
        &self,
        request: &RenderedRequest<'_>,
    ) -> Result<TransportResponse, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(Seen {
            url: request.url.to_string(),
            body: request.body.to_string(),
            headers: request
                .headers()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        });
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(call)
    }
}

/// Reports 50ms more cpu time on every sample.
#[derive(Default)]
struct Ticking {
    samples: AtomicU64,
    names: Mutex<Vec<String>>,
}

impl ProcessSampler for Ticking {
    fn sample(&self, name: &str) -> Result<ProcessSnapshot, ProcessSampleError> {
        let n = self.samples.fetch_add(1, Ordering::SeqCst) + 1;
        self.names.lock().unwrap().push(name.to_string());
        Ok(ProcessSnapshot {
            cpu_time_secs: n as f64 * 0.05,
            thread_count: 6,
            resident_memory_bytes: 4096 * n,
            binary_size_bytes: 1,
        })
    }
}

struct Missing;

impl ProcessSampler for Missing {
    fn sample(&self, name: &str) -> Result<ProcessSnapshot, ProcessSampleError> {
        Err(ProcessSampleError::NotFound(name.to_string()))
    }
}

fn capped(url: &str, concurrency: usize, cap: u64) -> TrialParameters {
    let mut params = TrialParameters::new(url).with_concurrency(concurrency);
    params.duration = Duration::ZERO;
    params.request_cap = cap;
    params
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn request_cap_is_exact_across_workers() {
    let transport = Scripted::with_delay(Duration::from_millis(2), |_| {
        Ok(TransportResponse::new(200, "ok"))
    });
    let engine = BenchEngine::new(transport.clone());

    let result = engine.run(&capped("http://localhost/", 4, 10)).await.unwrap();

    assert_eq!(result.total_requests(), 10);
    assert_eq!(result.stats.success, 10);
    assert_eq!(transport.calls(), 10);
    assert_eq!(result.stats.response_bytes, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deadline_stops_every_worker() {
    let transport = Scripted::with_delay(Duration::from_millis(50), |_| {
        Ok(TransportResponse::new(200, ""))
    });
    let engine = BenchEngine::new(transport.clone());
    let mut params = TrialParameters::new("http://localhost/").with_concurrency(3);
    params.duration = Duration::from_millis(300);

    let started = Instant::now();
    let result = engine.run(&params).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    // in-flight requests are abandoned, not waited for
    assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    assert!(result.total_requests() > 0);
    assert!(result.total_requests() <= transport.calls());
    assert!(transport.calls() - result.total_requests() <= 3);
}

#[tokio::test]
async fn outcomes_are_classified() {
    let transport = Scripted::new(|call| match call % 3 {
        0 => Ok(TransportResponse::new(200, "ok")),
        1 => Ok(TransportResponse::new(500, "boom")),
        _ => Err(TransportError::Connect("refused".into())),
    });
    let engine = BenchEngine::new(transport);

    let result = engine.run(&capped("http://localhost/", 1, 9)).await.unwrap();

    assert_eq!(result.stats.success, 3);
    assert_eq!(result.stats.non_success, 3);
    assert_eq!(result.stats.errors, 3);
    // only 2xx/3xx bodies count
    assert_eq!(result.stats.response_bytes, 6);
    assert!(result.latency.is_some());
}

#[tokio::test]
async fn json_content_type_is_added_once() {
    let transport = Scripted::ok();
    let engine = BenchEngine::new(transport.clone());

    let mut params = capped("http://localhost/", 1, 1);
    params.body = r#"{"n": 1}"#.into();
    engine.run(&params).await.unwrap();

    params.headers = vec![("content-type".into(), "text/plain".into())];
    engine.run(&params).await.unwrap();

    let seen = transport.seen();
    assert_eq!(
        seen[0].headers,
        [("Content-Type".to_string(), "application/json".to_string())]
    );
    assert_eq!(
        seen[1].headers,
        [("content-type".to_string(), "text/plain".to_string())]
    );
}

#[tokio::test]
async fn placeholders_are_rendered_per_request() {
    let transport = Scripted::ok();
    let engine = BenchEngine::new(transport.clone());

    let mut params = capped("http://localhost/items/__SEQ_1_3__", 1, 4);
    params.body = "__RANDHEX_8__".into();
    let result = engine.run(&params).await.unwrap();

    let seen = transport.seen();
    let urls: Vec<_> = seen.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(
        urls,
        [
            "http://localhost/items/1",
            "http://localhost/items/2",
            "http://localhost/items/3",
            "http://localhost/items/1",
        ]
    );
    assert!(seen
        .iter()
        .all(|s| s.body.len() == 8 && s.body.chars().all(|c| c.is_ascii_hexdigit())));
    assert_eq!(result.stats.request_bytes, 32);
}

#[tokio::test]
async fn sequences_continue_across_trials() {
    let transport = Scripted::ok();
    let engine = BenchEngine::new(transport.clone());
    let params = capped("http://localhost/__SEQ_10_20__", 1, 2);

    engine.run(&params).await.unwrap();
    engine.run(&params).await.unwrap();

    let urls: Vec<_> = transport.seen().into_iter().map(|s| s.url).collect();
    assert_eq!(
        urls,
        [
            "http://localhost/10",
            "http://localhost/11",
            "http://localhost/12",
            "http://localhost/13",
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn aggregate_rate_bounds_the_whole_trial() {
    let engine = BenchEngine::new(Scripted::ok());
    let mut params = TrialParameters::new("http://localhost/").with_concurrency(4);
    params.duration = Duration::from_millis(500);
    params.target_rps = 20.0;
    params.rate_mode = RateMode::Aggregate;

    let result = engine.run(&params).await.unwrap();

    // one permit every 50ms, the first one immediately
    let total = result.total_requests();
    assert!((5..=12).contains(&total), "{total}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn per_worker_rate_scales_with_concurrency() {
    let engine = BenchEngine::new(Scripted::ok());
    let mut params = TrialParameters::new("http://localhost/").with_concurrency(4);
    params.duration = Duration::from_millis(500);
    params.target_rps = 20.0;
    params.rate_mode = RateMode::PerWorker;

    let result = engine.run(&params).await.unwrap();

    // four workers, each ticking every 50ms after an initial wait
    let total = result.total_requests();
    assert!((24..=44).contains(&total), "{total}");
}

#[tokio::test]
async fn invalid_parameters_never_reach_the_transport() {
    let transport = Scripted::ok();
    let engine = BenchEngine::new(transport.clone());

    let err = engine
        .run(&TrialParameters::new("http://localhost/").with_concurrency(0))
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::Config(ConfigError::Concurrency(0))));

    let mut params = TrialParameters::new("http://localhost/");
    params.duration = Duration::ZERO;
    let err = engine.run(&params).await.unwrap_err();
    assert!(matches!(err, BenchError::Config(ConfigError::Duration)));

    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn errors_only_trial_has_no_latency_and_cannot_be_ranked() {
    let engine = BenchEngine::new(Scripted::new(|_| Err(TransportError::Timeout)));

    let result = engine.run(&capped("http://localhost/", 2, 6)).await.unwrap();

    assert_eq!(result.stats.errors, 6);
    assert!(result.latency.is_none());
    assert!(matches!(
        select_best([&result]),
        Err(BenchError::DegenerateMetric)
    ));
}

#[tokio::test]
async fn scheduler_runs_levels_in_order() {
    let engine = BenchEngine::new(Scripted::ok());
    let base = capped("http://localhost/", 1, 8);

    let mut live = Vec::new();
    let reports = TrialScheduler::new(&engine)
        .run_all(&[1, 2, 4], &base, |report| {
            live.push(report.result.params.concurrency)
        })
        .await
        .unwrap();

    assert_eq!(live, [1, 2, 4]);
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.result.total_requests() == 8));
    assert!(reports.iter().all(|r| r.process.is_none()));

    let err = TrialScheduler::new(&engine)
        .run_all(&[], &base, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::Config(ConfigError::NoLevels)));

    let err = TrialScheduler::new(&engine)
        .run_all(&[2, 0], &base, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::Config(ConfigError::Concurrency(0))));
}

#[tokio::test]
async fn sampler_brackets_every_trial() {
    let engine = BenchEngine::new(Scripted::with_delay(Duration::from_millis(25), |_| {
        Ok(TransportResponse::new(200, "ok"))
    }));
    let mut base = capped("http://localhost/", 1, 4);
    base.process_name = Some("server".into());
    let sampler = Ticking::default();

    let reports = TrialScheduler::new(&engine)
        .with_sampler(&sampler)
        .run_all(&[1, 1], &base, |_| {})
        .await
        .unwrap();

    assert_eq!(sampler.samples.load(Ordering::SeqCst), 4);
    assert!(sampler.names.lock().unwrap().iter().all(|n| n == "server"));
    for (trial, report) in reports.iter().enumerate() {
        let usage = report.process.unwrap();
        // 50ms of cpu over at least 100ms of wall time
        let cpu = usage.cpu_per_sec.unwrap();
        assert!(cpu > 0.0 && cpu < 0.51, "{cpu}");
        assert_eq!(usage.thread_count, 6);
        // figures come from the sample taken after the trial
        assert_eq!(usage.resident_memory_bytes, 4096 * (2 * trial as u64 + 2));
    }
}

#[tokio::test]
async fn sampling_failures_do_not_fail_the_trial() {
    let engine = BenchEngine::new(Scripted::ok());
    let mut base = capped("http://localhost/", 2, 6);
    base.process_name = Some("server".into());

    let reports = TrialScheduler::new(&engine)
        .with_sampler(&Missing)
        .run_all(&[2], &base, |_| {})
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].result.total_requests(), 6);
    assert!(reports[0].process.is_none());

    // no process name means no sampling at all
    let sampler = Ticking::default();
    base.process_name = None;
    let reports = TrialScheduler::new(&engine)
        .with_sampler(&sampler)
        .run_all(&[1], &base, |_| {})
        .await
        .unwrap();
    assert!(reports[0].process.is_none());
    assert_eq!(sampler.samples.load(Ordering::SeqCst), 0);
}
