use std::{
    collections::HashMap,
    fs::{self, File},
    io::prelude::*,
    path::Path,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    bench::{
        params::{parse_headers, parse_method},
        RateMode, TrialParameters,
    },
    error::ConfigError,
    logging::BenchLogger,
    transport::HttpVersion,
};

pub const DEFAULT_CONFIG_FILE: &str = "loadscope.toml";

/// Benchmark profile, loaded from a TOML file. Command line flags override it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BenchConfig {
    /// Target URL template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_method")]
    pub method: String,

    /// Body template; empty sends no body.
    #[serde(default)]
    pub body: String,

    /// Extra headers as `Name: value` lines.
    #[serde(default)]
    pub headers: Vec<String>,

    /// Concurrency levels, one trial each.
    #[serde(default = "default_connections")]
    pub connections: Vec<usize>,

    /// Length of each trial, e.g. "1s" or "500ms".
    #[serde(default = "default_duration")]
    pub duration: String,

    /// Requests per second, 0 = unbounded.
    #[serde(default)]
    pub rps: f64,

    /// Request budget per trial, 0 = unbounded.
    #[serde(default)]
    pub max_requests: u64,

    #[serde(default)]
    pub rate_mode: RateMode,

    /// "1.1" or "2".
    #[serde(default = "default_http_version")]
    pub http_version: String,

    /// Process to sample around each trial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,

    #[serde(default)]
    pub verbose: bool,

    #[serde(flatten)]
    pub other_fields: HashMap<String, toml::Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_connections() -> Vec<usize> {
    vec![1, 2, 4, 8, 16, 32]
}

fn default_duration() -> String {
    "1s".to_string()
}

fn default_http_version() -> String {
    "1.1".to_string()
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            url: None,
            method: default_method(),
            body: String::new(),
            headers: Vec::new(),
            connections: default_connections(),
            duration: default_duration(),
            rps: 0.0,
            max_requests: 0,
            rate_mode: RateMode::default(),
            http_version: default_http_version(),
            process: None,
            verbose: false,
            other_fields: HashMap::new(),
        }
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;

        for (key, value) in &config.other_fields {
            BenchLogger::unknown_config_field(key, value);
        }

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let config_str = toml::to_string(&self)?;
        let mut file = File::create(path)?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }

    pub fn trial_duration(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.duration)
    }

    pub fn http_version(&self) -> Result<HttpVersion, ConfigError> {
        self.http_version.parse()
    }

    /// Parameters shared by every trial; concurrency is set per level by the scheduler.
    pub fn trial_parameters(&self) -> Result<TrialParameters, ConfigError> {
        let url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingUrl)?;

        let mut params = TrialParameters::new(url);
        params.method = parse_method(&self.method)?;
        params.body = self.body.clone();
        params.headers = parse_headers(&self.headers);
        params.concurrency = self.connections.first().copied().unwrap_or(1);
        params.duration = self.trial_duration()?;
        params.request_cap = self.max_requests;
        params.target_rps = self.rps;
        params.rate_mode = self.rate_mode;
        params.verbose = self.verbose;
        params.process_name = self
            .process
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        params.validate()?;
        Ok(params)
    }
}

/// Accepts human readable durations ("1s", "250ms", "1m 30s") and a bare "0".
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let raw = raw.trim();
    if raw == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(raw).map_err(|_| ConfigError::DurationFormat(raw.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Could not open config")]
    Io(#[from] std::io::Error),
    #[error("Could not parse config - {0}")]
    Parse(#[from] toml::de::Error),
}
