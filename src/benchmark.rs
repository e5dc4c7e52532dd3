use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{Instant, timeout};

use crate::aggregate::aggregate;
use crate::client::{
    ClientConfig, ClientError, InferenceBackend, InferenceClient, wait_until_ready,
};
use crate::config::Config;
use crate::error::BenchError;
use crate::metrics::{Metrics, RUNNING};
use crate::report::{Report, ReportBuilder};
use crate::sample::{FailureKind, Sample};
use crate::sampler::{ModelTarget, Sampler};
use crate::stats::{Progress, periodic_stats};

/// Everything a run needs, resolved from configuration up front.
#[derive(Debug, Clone)]
pub struct BenchmarkPlan {
    pub models: Vec<ModelTarget>,
    pub repetitions: usize,
    pub prompt: String,
    pub request_timeout: Duration,
    pub deadline: Option<Duration>,
    pub concurrency: usize,
    /// How long to keep probing an endpoint that is not up yet (zero = probe once)
    pub ready_timeout: Duration,
    pub ready_interval: Duration,
}

impl BenchmarkPlan {
    pub fn from_config(config: &Config) -> Self {
        Self {
            models: config.models.iter().map(ModelTarget::from).collect(),
            repetitions: config.benchmark.repetitions,
            prompt: config.benchmark.prompt.clone(),
            request_timeout: Duration::from_secs(config.benchmark.request_timeout),
            deadline: config.benchmark.deadline.map(Duration::from_secs),
            concurrency: config.benchmark.concurrency,
            ready_timeout: Duration::from_secs(config.endpoint.ready_timeout),
            ready_interval: Duration::from_secs(config.endpoint.ready_interval),
        }
    }

    /// Number of samples a complete run produces.
    pub fn planned(&self) -> usize {
        self.models.len() * self.repetitions
    }

    fn validate(&self) -> Result<(), BenchError> {
        if self.models.is_empty() {
            return Err(BenchError::Configuration(
                "no models to benchmark".to_string(),
            ));
        }
        if self.repetitions == 0 {
            return Err(BenchError::Configuration(
                "repetitions must be greater than 0".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(BenchError::Configuration(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Raw result of a run, before aggregation.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// One sample per (model, repetition), in model order then repetition order
    pub samples: Vec<Sample>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// True when the overall deadline cut the run short
    pub partial: bool,
    /// Model tags the endpoint listed during the probe
    pub available: Vec<String>,
}

#[derive(Debug, Clone)]
struct Job {
    target: ModelTarget,
    repetition: usize,
}

/// Drives the sampler across every configured model and repetition.
///
/// Requests run on a pool of `concurrency` workers that pull jobs in order
/// from a shared index, so with the default of one worker the models are
/// sampled strictly one after another. Every job yields exactly one sample:
/// jobs the deadline cuts off are recorded as `cancelled` failures.
///
/// # Examples
///
/// ```no_run
/// use migbench::benchmark::{BenchmarkPlan, BenchmarkRunner};
/// use migbench::client::{ClientConfig, InferenceClient};
/// use migbench::config::ApiFlavor;
/// use migbench::sampler::ModelTarget;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = InferenceClient::new(ClientConfig {
///     base_url: "http://localhost:11434".to_string(),
///     api: ApiFlavor::Ollama,
///     api_key: None,
///     timeout: Duration::from_secs(60),
///     max_tokens: None,
/// })?;
/// let plan = BenchmarkPlan {
///     models: vec![ModelTarget::new("small", "llama3.2:1b")],
///     repetitions: 3,
///     prompt: "Explain CrashLoopBackOff".to_string(),
///     request_timeout: Duration::from_secs(60),
///     deadline: None,
///     concurrency: 1,
///     ready_timeout: Duration::ZERO,
///     ready_interval: Duration::from_secs(5),
/// };
/// let outcome = BenchmarkRunner::new(Arc::new(client), plan)?.run().await?;
/// println!("{} samples", outcome.samples.len());
/// # Ok(())
/// # }
/// ```
pub struct BenchmarkRunner<B> {
    backend: Arc<B>,
    plan: BenchmarkPlan,
}

impl<B: InferenceBackend> BenchmarkRunner<B> {
    pub fn new(backend: Arc<B>, plan: BenchmarkPlan) -> Result<Self, BenchError> {
        plan.validate()?;
        Ok(Self { backend, plan })
    }

    pub fn plan(&self) -> &BenchmarkPlan {
        &self.plan
    }

    async fn fetch_listing(&self) -> Result<Vec<String>, ClientError> {
        if self.plan.ready_timeout.is_zero() {
            self.backend.list_models().await
        } else {
            wait_until_ready(
                self.backend.as_ref(),
                self.plan.ready_timeout,
                self.plan.ready_interval,
            )
            .await
        }
    }

    fn unreachable(&self, e: &ClientError) -> BenchError {
        BenchError::EndpointUnreachable {
            endpoint: self.backend.describe(),
            reason: e.to_string(),
        }
    }

    /// List the endpoint's models, failing if nothing answers.
    pub async fn probe(&self) -> Result<Vec<String>, BenchError> {
        match self.fetch_listing().await {
            Ok(models) => Ok(models),
            Err(e) if e.is_unreachable() => Err(self.unreachable(&e)),
            Err(e) => {
                // Reachable but the listing is unusable; the samples will tell
                warn!("Could not list models at {}: {}", self.backend.describe(), e);
                Ok(Vec::new())
            }
        }
    }

    /// List the endpoint's models, failing on any listing error.
    pub async fn list_models(&self) -> Result<Vec<String>, BenchError> {
        match self.fetch_listing().await {
            Ok(models) => Ok(models),
            Err(e) if e.is_unreachable() => Err(self.unreachable(&e)),
            Err(e) => Err(BenchError::ModelListing {
                endpoint: self.backend.describe(),
                reason: e.to_string(),
            }),
        }
    }

    /// Run every (model, repetition) pair and collect the samples.
    pub async fn run(&self) -> Result<RunOutcome, BenchError> {
        RUNNING.store(true, Ordering::Relaxed);
        let result = self.sample_all().await;
        RUNNING.store(false, Ordering::Relaxed);
        result
    }

    async fn sample_all(&self) -> Result<RunOutcome, BenchError> {
        // The deadline covers the readiness wait as well as the samples
        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = self.plan.deadline.map(|d| start + d);

        let available = self.probe().await?;
        if !available.is_empty() {
            for target in &self.plan.models {
                if !available.iter().any(|name| name == &target.name) {
                    warn!(
                        "Model {} is not available at {}. Run: ollama pull {}",
                        target.name,
                        self.backend.describe(),
                        target.name
                    );
                }
            }
        }

        let jobs: Arc<Vec<Job>> = Arc::new(
            self.plan
                .models
                .iter()
                .flat_map(|target| {
                    (0..self.plan.repetitions).map(move |repetition| Job {
                        target: target.clone(),
                        repetition,
                    })
                })
                .collect(),
        );

        let workers = self.plan.concurrency.min(jobs.len());
        info!(
            "Sampling {} models x {} repetitions with {} worker{}",
            self.plan.models.len(),
            self.plan.repetitions,
            workers,
            if workers == 1 { "" } else { "s" }
        );

        let sampler = Sampler::new(Arc::clone(&self.backend), self.plan.request_timeout);
        let prompt: Arc<str> = Arc::from(self.plan.prompt.as_str());
        let next_job = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let sampler = sampler.clone();
            let jobs = Arc::clone(&jobs);
            let prompt = Arc::clone(&prompt);
            let next_job = Arc::clone(&next_job);

            handles.push(tokio::spawn(async move {
                let mut finished = Vec::new();
                loop {
                    let idx = next_job.fetch_add(1, Ordering::Relaxed);
                    let Some(job) = jobs.get(idx) else {
                        break;
                    };
                    debug!(
                        "Worker {} taking {}#{}",
                        worker_id, job.target.id, job.repetition
                    );
                    let sample = execute_job(&sampler, job, &prompt, deadline).await;
                    finished.push((idx, sample));
                }
                finished
            }));
        }

        // Slots keep the job order no matter which worker finished first
        let mut slots: Vec<Option<Sample>> = vec![None; jobs.len()];
        for handle in handles {
            match handle.await {
                Ok(finished) => {
                    for (idx, sample) in finished {
                        slots[idx] = Some(sample);
                    }
                }
                Err(e) => warn!("Sample worker failed: {}", e),
            }
        }

        let samples: Vec<Sample> = slots
            .into_iter()
            .zip(jobs.iter())
            .map(|(slot, job)| {
                slot.unwrap_or_else(|| {
                    let sample = Sample::failure(
                        job.target.id.clone(),
                        job.repetition,
                        &prompt,
                        Duration::ZERO,
                        FailureKind::Other,
                        "sample worker exited before recording a result",
                    );
                    Metrics::record_outcome(&sample);
                    sample
                })
            })
            .collect();

        let elapsed = start.elapsed();
        let partial = samples
            .iter()
            .any(|s| s.error_detail == Some(FailureKind::Cancelled));
        let succeeded = samples.iter().filter(|s| s.succeeded).count();

        info!(
            "Benchmark completed in {:.1}s: {} of {} samples succeeded",
            elapsed.as_secs_f64(),
            succeeded,
            samples.len()
        );
        if partial {
            warn!("Deadline expired, report will be partial");
        }

        Ok(RunOutcome {
            samples,
            started_at,
            elapsed,
            partial,
            available,
        })
    }
}

async fn execute_job<B: InferenceBackend>(
    sampler: &Sampler<B>,
    job: &Job,
    prompt: &str,
    deadline: Option<Instant>,
) -> Sample {
    let Some(deadline) = deadline else {
        return sampler.sample(&job.target, job.repetition, prompt).await;
    };

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        let sample = Sample::failure(
            job.target.id.clone(),
            job.repetition,
            prompt,
            Duration::ZERO,
            FailureKind::Cancelled,
            "deadline expired before the request started",
        );
        Metrics::record_outcome(&sample);
        return sample;
    }

    let started = Instant::now();
    match timeout(remaining, sampler.sample(&job.target, job.repetition, prompt)).await {
        Ok(sample) => sample,
        Err(_) => {
            debug!(
                "Sample {}#{} cancelled due to run deadline",
                job.target.id, job.repetition
            );
            let sample = Sample::failure(
                job.target.id.clone(),
                job.repetition,
                prompt,
                started.elapsed(),
                FailureKind::Cancelled,
                "deadline expired during the request",
            );
            Metrics::record_outcome(&sample);
            sample
        }
    }
}

/// Outcome of checking the configured models against the endpoint listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub target: ModelTarget,
    pub available: bool,
}

fn build_client(config: &Config) -> Result<InferenceClient, BenchError> {
    InferenceClient::new(ClientConfig {
        base_url: config.endpoint.base_url.clone(),
        api: config.endpoint.api,
        api_key: config.endpoint.api_key.clone(),
        timeout: Duration::from_secs(config.benchmark.request_timeout),
        max_tokens: config.benchmark.max_tokens,
    })
    .map_err(|e| BenchError::Configuration(format!("cannot build HTTP client: {}", e)))
}

/// Ask the endpoint for its models and report which configured ones it serves.
///
/// An unusable listing is an error here, not a warning.
pub async fn check_models(config: &Config) -> Result<Vec<Availability>, BenchError> {
    let client = Arc::new(build_client(config)?);
    let runner = BenchmarkRunner::new(client, BenchmarkPlan::from_config(config))?;
    let listed = runner.list_models().await?;

    Ok(runner
        .plan()
        .models
        .iter()
        .map(|target| Availability {
            target: target.clone(),
            available: listed.iter().any(|name| name == &target.name),
        })
        .collect())
}

/// Run a complete benchmark from configuration and build its report.
///
/// This is the library entry point behind `migbench bench`: probe, sample,
/// aggregate. Writing the report is left to the caller.
pub async fn run_benchmark(config: &Config) -> Result<Report, BenchError> {
    let client = Arc::new(build_client(config)?);
    let endpoint = client.describe();
    let plan = BenchmarkPlan::from_config(config);
    let progress = Progress::start(plan.planned() as u64);
    let runner = BenchmarkRunner::new(client, plan)?;

    let stats_handle = if !config.output.quiet {
        let interval = humantime::parse_duration(&config.output.progress_interval)
            .ok()
            .filter(|interval| !interval.is_zero())
            .unwrap_or(Duration::from_secs(10));
        Some(tokio::spawn(periodic_stats(interval, progress)))
    } else {
        None
    };

    let outcome = runner.run().await;

    if let Some(handle) = stats_handle {
        let _ = handle.await;
    }
    let outcome = outcome?;

    let stats = aggregate(&outcome.samples);
    Ok(ReportBuilder::new(endpoint, config)
        .with_outcome(&outcome)
        .build(stats, config.output.rank))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::ModelId;
    use crate::sampler::testing::{ScriptedBackend, Step};
    use serde_json::{Value, json};
    use warp::Filter;
    use warp::http::StatusCode;

    macro_rules! serve {
        ($routes:expr) => {{
            let (addr, server) = warp::serve($routes).bind_ephemeral(([127, 0, 0, 1], 0));
            tokio::spawn(server);
            format!("http://{}", addr)
        }};
    }

    /// Ollama stand-in serving only `llama3.2:1b`.
    fn ollama_routes() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection>
    + Clone
    + Send
    + Sync
    + 'static {
        let tags = warp::path!("api" / "tags")
            .and(warp::get())
            .map(|| warp::reply::json(&json!({"models": [{"name": "llama3.2:1b"}]})));
        let generate = warp::path!("api" / "generate")
            .and(warp::post())
            .and(warp::body::json())
            .map(|body: Value| {
                if body["model"] == json!("llama3.2:1b") {
                    warp::reply::with_status(
                        warp::reply::json(&json!({
                            "model": body["model"],
                            "response": "kubectl get pods",
                            "done": true,
                            "eval_count": 50
                        })),
                        StatusCode::OK,
                    )
                } else {
                    warp::reply::with_status(
                        warp::reply::json(&json!({"error": "model not found"})),
                        StatusCode::NOT_FOUND,
                    )
                }
            });
        tags.or(generate)
    }

    /// Config listing the unserved `large` model ahead of the served `small` one.
    fn served_config(base_url: &str) -> Config {
        Config::parse(&format!(
            r#"
[endpoint]
base_url = "{}"
ready_timeout = 0

[benchmark]
repetitions = 2
request_timeout = 5

[[models]]
id = "large"
name = "llama3.1:8b"

[[models]]
id = "small"
name = "llama3.2:1b"

[output]
quiet = true
rank = true
"#,
            base_url
        ))
        .unwrap()
    }

    fn closed_port() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    fn plan(models: &[(&str, &str)], repetitions: usize) -> BenchmarkPlan {
        BenchmarkPlan {
            models: models
                .iter()
                .map(|(id, name)| ModelTarget::new(*id, *name))
                .collect(),
            repetitions,
            prompt: "prompt".to_string(),
            request_timeout: Duration::from_secs(30),
            deadline: None,
            concurrency: 1,
            ready_timeout: Duration::ZERO,
            ready_interval: Duration::from_secs(1),
        }
    }

    fn reply(tokens: u64, secs: u64) -> Step {
        Step::Reply {
            tokens,
            delay: Duration::from_secs(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_pair_yields_one_sample_in_order() {
        let backend = ScriptedBackend::new()
            .script("s", vec![reply(50, 1)])
            .script("m", vec![reply(50, 1)]);
        let runner =
            BenchmarkRunner::new(Arc::new(backend), plan(&[("small", "s"), ("medium", "m")], 3))
                .unwrap();

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome.samples.len(), 6);
        assert!(!outcome.partial);

        let order: Vec<(String, usize)> = outcome
            .samples
            .iter()
            .map(|s| (s.model.to_string(), s.repetition))
            .collect();
        assert_eq!(
            order,
            vec![
                ("small".to_string(), 0),
                ("small".to_string(), 1),
                ("small".to_string(), 2),
                ("medium".to_string(), 0),
                ("medium".to_string(), 1),
                ("medium".to_string(), 2),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_by_default() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .script("a", vec![reply(10, 2)])
                .script("b", vec![reply(10, 2)]),
        );
        let runner =
            BenchmarkRunner::new(Arc::clone(&backend), plan(&[("a", "a"), ("b", "b")], 2)).unwrap();

        let outcome = runner.run().await.unwrap();
        // Four 2s requests, one at a time
        assert!(outcome.elapsed >= Duration::from_secs(8));
        assert_eq!(
            *backend.calls.lock().unwrap(),
            vec!["a".to_string(), "a".to_string(), "b".to_string(), "b".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_concurrency_overlaps_requests() {
        let backend = ScriptedBackend::new().script("a", vec![reply(10, 2)]);
        let mut plan = plan(&[("a", "a")], 4);
        plan.concurrency = 2;
        let runner = BenchmarkRunner::new(Arc::new(backend), plan).unwrap();

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome.samples.len(), 4);
        assert!(outcome.elapsed < Duration::from_secs(8));
        let reps: Vec<usize> = outcome.samples.iter().map(|s| s.repetition).collect();
        assert_eq!(reps, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_samples_are_kept() {
        let backend = ScriptedBackend::new().script(
            "s",
            vec![Step::Fail(FailureKind::Timeout), reply(20, 0)],
        );
        let runner = BenchmarkRunner::new(Arc::new(backend), plan(&[("small", "s")], 2)).unwrap();

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome.samples.len(), 2);
        assert_eq!(outcome.samples[0].error_detail, Some(FailureKind::Timeout));
        assert!(outcome.samples[1].succeeded);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fatal() {
        let backend =
            ScriptedBackend::new().listing(Err(FailureKind::ConnectionRefused));
        let runner = BenchmarkRunner::new(Arc::new(backend), plan(&[("small", "s")], 2)).unwrap();

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, BenchError::EndpointUnreachable { .. }));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_unusable_listing_is_not_fatal() {
        let backend = ScriptedBackend::new()
            .listing(Err(FailureKind::HttpError))
            .script("s", vec![reply(5, 0)]);
        let runner = BenchmarkRunner::new(Arc::new(backend), plan(&[("small", "s")], 1)).unwrap();

        let outcome = runner.run().await.unwrap();
        assert!(outcome.samples[0].succeeded);
    }

    #[tokio::test]
    async fn test_missing_model_is_still_sampled() {
        let backend = ScriptedBackend::new()
            .listing(Ok(vec!["other".to_string()]))
            .script("s", vec![Step::Fail(FailureKind::HttpError)]);
        let runner = BenchmarkRunner::new(Arc::new(backend), plan(&[("small", "s")], 2)).unwrap();

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome.samples.len(), 2);
        assert!(outcome.samples.iter().all(|s| !s.succeeded));
        assert_eq!(outcome.available, vec!["other".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_produces_partial_run() {
        let backend = ScriptedBackend::new()
            .script("s", vec![reply(10, 4)])
            .script("m", vec![Step::Hang]);
        let mut plan = plan(&[("small", "s"), ("medium", "m")], 2);
        plan.deadline = Some(Duration::from_secs(10));
        let runner = BenchmarkRunner::new(Arc::new(backend), plan).unwrap();

        let outcome = runner.run().await.unwrap();
        assert!(outcome.partial);
        assert_eq!(outcome.samples.len(), 4);

        let small: Vec<&Sample> = outcome
            .samples
            .iter()
            .filter(|s| s.model == ModelId::new("small"))
            .collect();
        assert!(small.iter().all(|s| s.succeeded));

        // First medium request hangs until the deadline, the second never starts
        let medium: Vec<Option<FailureKind>> = outcome
            .samples
            .iter()
            .filter(|s| s.model == ModelId::new("medium"))
            .map(|s| s.error_detail)
            .collect();
        assert_eq!(
            medium,
            vec![Some(FailureKind::Cancelled), Some(FailureKind::Cancelled)]
        );
        assert!(outcome.elapsed <= Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_includes_readiness_wait() {
        let backend = ScriptedBackend::new()
            .slow_listing(Duration::from_secs(8))
            .script("s", vec![reply(10, 4)]);
        let mut plan = plan(&[("small", "s")], 2);
        plan.deadline = Some(Duration::from_secs(10));
        let runner = BenchmarkRunner::new(Arc::new(backend), plan).unwrap();

        let outcome = runner.run().await.unwrap();
        assert!(outcome.partial);
        assert_eq!(outcome.samples.len(), 2);
        assert!(
            outcome
                .samples
                .iter()
                .all(|s| s.error_detail == Some(FailureKind::Cancelled))
        );
        assert!(outcome.elapsed <= Duration::from_secs(11));
    }

    #[tokio::test]
    async fn test_run_benchmark_against_served_endpoint() {
        let base = serve!(ollama_routes());
        let config = served_config(&base);

        let report = run_benchmark(&config).await.unwrap();
        assert!(report.metadata.ranked);
        assert!(!report.metadata.partial);

        let order: Vec<String> = report.stats.iter().map(|s| s.model.to_string()).collect();
        assert_eq!(order, vec!["small".to_string(), "large".to_string()]);

        let small = &report.stats[0];
        assert_eq!(small.sample_count, 2);
        assert_eq!(small.total_output_tokens, 100);
        assert!(small.mean_tokens_per_second.is_some());

        let large = &report.stats[1];
        assert_eq!(large.attempts, 2);
        assert_eq!(large.failure_count, 2);
        assert_eq!(large.failures.get(&FailureKind::HttpError), Some(&2));
        assert_eq!(large.mean_tokens_per_second, None);
    }

    #[tokio::test]
    async fn test_check_models_flags_missing_model() {
        let base = serve!(ollama_routes());
        let config = served_config(&base);

        let availability = check_models(&config).await.unwrap();
        let flags: Vec<(String, bool)> = availability
            .iter()
            .map(|a| (a.target.id.to_string(), a.available))
            .collect();
        assert_eq!(
            flags,
            vec![("large".to_string(), false), ("small".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn test_check_models_surfaces_listing_error() {
        let route = warp::path!("api" / "tags").map(|| {
            warp::reply::with_status("unauthorized", StatusCode::UNAUTHORIZED)
        });
        let config = served_config(&serve!(route));

        let err = check_models(&config).await.unwrap_err();
        assert!(matches!(err, BenchError::ModelListing { .. }));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_run_benchmark_unreachable_endpoint() {
        let config = served_config(&closed_port());

        let err = run_benchmark(&config).await.unwrap_err();
        assert!(matches!(err, BenchError::EndpointUnreachable { .. }));
    }

    #[test]
    fn test_empty_plan_rejected() {
        let backend = ScriptedBackend::new();
        let result = BenchmarkRunner::new(Arc::new(backend), plan(&[], 3));
        assert!(matches!(result, Err(BenchError::Configuration(_))));
    }

    #[test]
    fn test_plan_from_config() {
        let config = Config::parse(
            r#"
[endpoint]
base_url = "http://localhost:11434"
ready_timeout = 30

[benchmark]
repetitions = 2
deadline = 120
concurrency = 2

[[models]]
id = "small"
name = "llama3.2:1b"

[[models]]
id = "large"
name = "llama3.1:8b"
"#,
        )
        .unwrap();

        let plan = BenchmarkPlan::from_config(&config);
        assert_eq!(plan.planned(), 4);
        assert_eq!(plan.models[1], ModelTarget::new("large", "llama3.1:8b"));
        assert_eq!(plan.deadline, Some(Duration::from_secs(120)));
        assert_eq!(plan.ready_timeout, Duration::from_secs(30));
    }
}
