use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use loadscope::{
    bench::{BenchEngine, RateMode},
    compare::record_and_compare,
    config::{BenchConfig, ConfigLoadError, DEFAULT_CONFIG_FILE},
    logging::BenchLogger,
    process::{ProcessSampler, SysinfoSampler},
    report,
    scheduler::{select_best, TrialScheduler},
    snapshot::PersistedSnapshot,
    transport::build_transport,
};

#[cfg(feature = "mimalloc")]
mod mimalloc {
    use mimalloc::MiMalloc;

    #[global_allocator]
    static GLOBAL: MiMalloc = MiMalloc;
}

/// Benchmarks an HTTP endpoint at increasing concurrency and reports the best level.
///
/// URL and body accept placeholders expanded per request: __RANDI64_lo_hi__,
/// __RANDHEX_n__, __RANDSTR_<letters|digits|lettersdigits>_n__ and __SEQ_lo_hi__.
#[derive(Parser, Debug)]
#[command(name = "loadscope", version)]
struct Cli {
    /// Target URL
    url: Option<String>,

    /// Concurrency levels, comma separated (default 1,2,4,8,16,32)
    #[arg(short, long, value_delimiter = ',')]
    connections: Vec<usize>,

    /// Duration of each trial, e.g. 1s, 500ms
    #[arg(short, long)]
    duration: Option<String>,

    /// HTTP method
    #[arg(short = 'X', long)]
    method: Option<String>,

    /// Request body template
    #[arg(short, long)]
    body: Option<String>,

    /// Extra header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Requests per second, 0 = unbounded
    #[arg(long)]
    rps: Option<f64>,

    /// Request budget per trial, 0 = unbounded
    #[arg(long)]
    max_requests: Option<u64>,

    /// How --rps applies: aggregate (whole trial) or per-worker
    #[arg(long)]
    rate_mode: Option<RateMode>,

    /// HTTP version: 1.1 or 2
    #[arg(long = "http")]
    http_version: Option<String>,

    /// Process to sample around each trial
    #[arg(short = 'p', long = "name")]
    process: Option<String>,

    /// Trace every request and response
    #[arg(short, long)]
    verbose: bool,

    /// TOML profile (defaults to ./loadscope.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the merged profile to this path
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Write the best result as JSON to a path, or to stdout (JSON only) when no path is given
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    best_json: Option<String>,

    /// Compare against an existing --best-json file instead of overwriting it
    #[arg(long, requires = "best_json")]
    compare: bool,
}

impl Cli {
    fn apply(&self, config: &mut BenchConfig) {
        if let Some(url) = &self.url {
            config.url = Some(url.clone());
        }
        if !self.connections.is_empty() {
            config.connections = self.connections.clone();
        }
        if let Some(duration) = &self.duration {
            config.duration = duration.clone();
        }
        if let Some(method) = &self.method {
            config.method = method.clone();
        }
        if let Some(body) = &self.body {
            config.body = body.clone();
        }
        config.headers.extend(self.headers.iter().cloned());
        if let Some(rps) = self.rps {
            config.rps = rps;
        }
        if let Some(max_requests) = self.max_requests {
            config.max_requests = max_requests;
        }
        if let Some(rate_mode) = self.rate_mode {
            config.rate_mode = rate_mode;
        }
        if let Some(version) = &self.http_version {
            config.http_version = version.clone();
        }
        if let Some(process) = &self.process {
            config.process = Some(process.clone());
        }
        config.verbose |= self.verbose;
    }
}

fn load_profile(explicit: Option<&Path>) -> anyhow::Result<BenchConfig> {
    let Some(path) = explicit else {
        return match BenchConfig::load(Path::new(DEFAULT_CONFIG_FILE)) {
            Ok(config) => Ok(config),
            Err(ConfigLoadError::Io(_)) => Ok(BenchConfig::default()),
            Err(err) => Err(err).context(DEFAULT_CONFIG_FILE),
        };
    };
    BenchConfig::load(path).with_context(|| format!("{}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _ = dotenvy::dotenv();
    #[cfg(debug_assertions)]
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .init();
    #[cfg(not(debug_assertions))]
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "info" } else { "warn" }),
    )
    .init();

    let mut config = load_profile(cli.config.as_deref())?;
    cli.apply(&mut config);
    if let Some(path) = &cli.save_config {
        config.save(path)?;
    }

    let params = config.trial_parameters()?;
    let transport = build_transport(config.http_version()?)?;
    let engine = BenchEngine::new(transport);

    let json_only = cli.best_json.as_deref() == Some("");
    let sampler = SysinfoSampler::new();

    if let (false, Some(name)) = (json_only, params.process_name.as_deref()) {
        match sampler.sample(name) {
            Ok(snapshot) => print!("{}", report::process_banner(name, &snapshot)),
            Err(err) => BenchLogger::process_sample_failed("before", name, &err),
        }
    }

    if !json_only {
        println!("{}", report::trial_table_header());
    }
    let reports = TrialScheduler::new(&engine)
        .with_sampler(&sampler)
        .run_all(&config.connections, &params, |trial| {
            if !json_only {
                println!("{}", report::trial_table_row(trial));
            }
        })
        .await?;
    if !json_only {
        println!("{}", report::trial_table_footer());
    }

    let best = select_best(reports.iter().map(|r| &r.result))?;
    if !json_only {
        println!("{}", report::best_summary(best));
    }

    if let Some(path) = cli.best_json.as_deref() {
        let snapshot = PersistedSnapshot::from(best);
        if path.is_empty() {
            print!("{}", snapshot.to_json()?);
        } else {
            let rows = record_and_compare(Path::new(path), &snapshot, cli.compare)?;
            if !json_only && !rows.is_empty() {
                println!("{}", report::compare_table(&rows));
            }
        }
    }

    Ok(())
}
