pub mod admin;
pub mod aggregate;
pub mod benchmark;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod report;
pub mod sample;
pub mod sampler;
pub mod stats;

pub use aggregate::{AggregateStat, aggregate, rank};
pub use benchmark::{BenchmarkPlan, BenchmarkRunner, RunOutcome, check_models, run_benchmark};
pub use cli::Cli;
pub use client::{ClientConfig, ClientError, InferenceBackend, InferenceClient};
pub use config::Config;
pub use error::BenchError;
pub use metrics::Metrics;
pub use report::{Report, ReportBuilder};
pub use sample::{FailureKind, ModelId, Sample};
pub use sampler::{ModelTarget, Sampler};
