use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::BenchError;

/// Prompt sent to every model when the config does not override it.
pub const DEFAULT_PROMPT: &str = "Explain how to troubleshoot a Kubernetes pod that is stuck in \
CrashLoopBackOff state. Be specific and provide kubectl commands.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    #[serde(default)]
    pub api: ApiFlavor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub ready_timeout: u64, // Seconds to wait for the endpoint to come up (0 = probe once)
    #[serde(default = "default_ready_interval")]
    pub ready_interval: u64,
}

/// Wire protocol spoken by the inference endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    /// Ollama native API (`/api/generate`, `/api/tags`)
    #[default]
    Ollama,
    /// OpenAI-compatible API (`/chat/completions`, `/models`)
    OpenAI,
}

impl std::fmt::Display for ApiFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiFlavor::Ollama => write!(f, "ollama"),
            ApiFlavor::OpenAI => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<u64>, // Overall wall-clock limit in seconds
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// One benchmarked model and the GPU partition it is meant to run on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Grouping key used throughout the report (e.g. "small")
    pub id: String,
    /// Model tag sent to the endpoint; defaults to `id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mig_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pods_per_gpu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_case: Option<String>,
}

impl ModelConfig {
    pub fn model_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub rank: bool,
    #[serde(default)]
    pub quiet: bool,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Html,
    Json,
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Json => "json",
            OutputFormat::Text => "txt",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    /// Per-module log level overrides (e.g., ["hyper=info", "reqwest=warn"])
    #[serde(default)]
    pub filter: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_listen")]
    pub listen: String,
    #[serde(default = "default_admin_enabled")]
    pub enabled: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen: default_admin_listen(),
            enabled: default_admin_enabled(),
        }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            repetitions: default_repetitions(),
            prompt: default_prompt(),
            request_timeout: default_request_timeout(),
            deadline: None,
            concurrency: default_concurrency(),
            max_tokens: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: OutputFormat::default(),
            rank: false,
            quiet: false,
            progress_interval: default_progress_interval(),
            trace_log: None,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            filter: Vec::new(),
        }
    }
}

fn default_ready_interval() -> u64 {
    5
}

fn default_repetitions() -> usize {
    3
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_concurrency() -> usize {
    1 // Sequential
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_progress_interval() -> String {
    "10s".to_string()
}

fn default_worker_threads() -> usize {
    num_cpus::get()
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_admin_listen() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_admin_enabled() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BenchError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, BenchError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| BenchError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        let fail = |msg: &str| Err(BenchError::Configuration(msg.to_string()));

        if self.endpoint.base_url.trim().is_empty() {
            return fail("endpoint.base_url must not be empty");
        }

        if self.models.is_empty() {
            return fail("at least one [[models]] entry is required");
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            if model.id.trim().is_empty() {
                return fail("model id must not be empty");
            }
            if !seen.insert(model.id.as_str()) {
                return Err(BenchError::Configuration(format!(
                    "duplicate model id: {}",
                    model.id
                )));
            }
        }

        if self.benchmark.repetitions == 0 {
            return fail("benchmark.repetitions must be greater than 0");
        }

        if self.benchmark.concurrency == 0 {
            return fail("benchmark.concurrency must be greater than 0");
        }

        if self.benchmark.request_timeout == 0 {
            return fail("benchmark.request_timeout must be greater than 0");
        }

        if let Some(deadline) = self.benchmark.deadline
            && deadline == 0
        {
            return fail("benchmark.deadline must be greater than 0");
        }

        match humantime::parse_duration(&self.output.progress_interval) {
            Ok(interval) if interval.is_zero() => {
                return fail("output.progress_interval must be greater than 0");
            }
            Ok(_) => {}
            Err(_) => {
                return Err(BenchError::Configuration(format!(
                    "invalid output.progress_interval: {}",
                    self.output.progress_interval
                )));
            }
        }

        if self.runtime.worker_threads == 0 {
            return fail("runtime.worker_threads must be greater than 0");
        }

        Ok(())
    }
}
