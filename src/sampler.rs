use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::client::InferenceBackend;
use crate::config::ModelConfig;
use crate::metrics::Metrics;
use crate::sample::{FailureKind, ModelId, Sample};

/// A model to benchmark: its grouping key and the tag sent to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTarget {
    pub id: ModelId,
    pub name: String,
}

impl ModelTarget {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ModelId::new(id),
            name: name.into(),
        }
    }
}

impl From<&ModelConfig> for ModelTarget {
    fn from(model: &ModelConfig) -> Self {
        Self::new(model.id.clone(), model.model_name())
    }
}

/// Issues single timed inference requests.
///
/// A sampler never fails: transport errors, timeouts and bad responses all
/// come back as a failed [`Sample`] so one bad request cannot abort a run.
pub struct Sampler<B> {
    backend: Arc<B>,
    timeout: Duration,
}

impl<B> Clone for Sampler<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            timeout: self.timeout,
        }
    }
}

impl<B: InferenceBackend> Sampler<B> {
    pub fn new(backend: Arc<B>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time one generation of `prompt` on `target`, from request start until
    /// the full response has been read.
    pub async fn sample(&self, target: &ModelTarget, repetition: usize, prompt: &str) -> Sample {
        let _inflight = Metrics::start_request();
        let start = Instant::now();

        let result = tokio::time::timeout(self.timeout, self.backend.generate(&target.name, prompt)).await;
        let elapsed = start.elapsed();

        let sample = match result {
            Ok(Ok(completion)) => {
                if !completion.tokens_reported {
                    debug!(
                        "{} did not report token usage, using word count ({})",
                        target.name, completion.output_tokens
                    );
                }
                Sample::success(
                    target.id.clone(),
                    repetition,
                    prompt,
                    elapsed,
                    completion.output_tokens,
                    &completion.text,
                )
            }
            Ok(Err(e)) => {
                Sample::failure(target.id.clone(), repetition, prompt, elapsed, e.kind(), e.to_string())
            }
            Err(_) => Sample::failure(
                target.id.clone(),
                repetition,
                prompt,
                elapsed,
                FailureKind::Timeout,
                format!("Timeout after {:?}", self.timeout),
            ),
        };

        Metrics::record_outcome(&sample);

        if sample.succeeded {
            debug!(
                "Sample {}#{} completed - tokens: {}, total_ms: {:.1}",
                target.id,
                repetition,
                sample.output_tokens,
                elapsed.as_secs_f64() * 1000.0
            );
        } else {
            debug!(
                "Sample {}#{} failed ({}): {}",
                target.id,
                repetition,
                sample.error_detail.unwrap_or(FailureKind::Other),
                sample.error_message.as_deref().unwrap_or_default()
            );
        }

        sample
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::client::{ClientError, Completion};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// What a scripted backend does for one call.
    #[derive(Debug, Clone)]
    pub enum Step {
        Reply { tokens: u64, delay: Duration },
        Fail(FailureKind),
        Hang,
    }

    /// In-memory backend replaying a per-model script of steps.
    ///
    /// Once a model's script runs out its last step repeats.
    pub struct ScriptedBackend {
        scripts: Mutex<HashMap<String, Vec<Step>>>,
        pub listed: Result<Vec<String>, FailureKind>,
        pub listing_delay: Duration,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        pub fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                listed: Ok(Vec::new()),
                listing_delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn script(self, model: &str, steps: Vec<Step>) -> Self {
            self.scripts.lock().unwrap().insert(model.to_string(), steps);
            self
        }

        pub fn listing(mut self, listed: Result<Vec<String>, FailureKind>) -> Self {
            self.listed = listed;
            self
        }

        /// Delay every model listing, like an endpoint that is slow to come up.
        pub fn slow_listing(mut self, delay: Duration) -> Self {
            self.listing_delay = delay;
            self
        }

        fn next_step(&self, model: &str) -> Step {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(model) {
                Some(steps) if steps.len() > 1 => steps.remove(0),
                Some(steps) if steps.len() == 1 => steps[0].clone(),
                _ => Step::Fail(FailureKind::HttpError),
            }
        }
    }

    fn error_for(kind: FailureKind) -> ClientError {
        match kind {
            FailureKind::Timeout => ClientError::Timeout(Duration::from_secs(1)),
            FailureKind::ConnectionRefused => ClientError::Connection("refused".to_string()),
            FailureKind::MalformedResponse => ClientError::Parse("bad json".to_string()),
            FailureKind::HttpError => ClientError::Http {
                status: 404,
                message: "model not found".to_string(),
            },
            _ => ClientError::Other("boom".to_string()),
        }
    }

    impl InferenceBackend for ScriptedBackend {
        async fn generate(&self, model: &str, _prompt: &str) -> Result<Completion, ClientError> {
            self.calls.lock().unwrap().push(model.to_string());
            match self.next_step(model) {
                Step::Reply { tokens, delay } => {
                    tokio::time::sleep(delay).await;
                    Ok(Completion {
                        text: format!("{} tokens from {}", tokens, model),
                        output_tokens: tokens,
                        tokens_reported: true,
                    })
                }
                Step::Fail(kind) => Err(error_for(kind)),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ClientError::Other("unreachable".to_string()))
                }
            }
        }

        async fn list_models(&self) -> Result<Vec<String>, ClientError> {
            if !self.listing_delay.is_zero() {
                tokio::time::sleep(self.listing_delay).await;
            }
            self.listed.clone().map_err(error_for)
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ScriptedBackend, Step};
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_successful_sample_measures_elapsed() {
        let backend = ScriptedBackend::new().script(
            "llama3.2:1b",
            vec![Step::Reply {
                tokens: 50,
                delay: Duration::from_secs(1),
            }],
        );
        let sampler = Sampler::new(Arc::new(backend), Duration::from_secs(60));
        let target = ModelTarget::new("small", "llama3.2:1b");

        let sample = sampler.sample(&target, 0, "prompt").await;
        assert!(sample.succeeded);
        assert_eq!(sample.model, ModelId::new("small"));
        assert_eq!(sample.output_tokens, 50);
        assert!(sample.elapsed >= Duration::from_secs(1));
        assert!(sample.elapsed < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_request_becomes_timeout_sample() {
        let backend = ScriptedBackend::new().script("m", vec![Step::Hang]);
        let sampler = Sampler::new(Arc::new(backend), Duration::from_secs(5));

        let sample = sampler.sample(&ModelTarget::new("m", "m"), 3, "prompt").await;
        assert!(!sample.succeeded);
        assert_eq!(sample.repetition, 3);
        assert_eq!(sample.error_detail, Some(FailureKind::Timeout));
        assert_eq!(sample.output_tokens, 0);
    }

    #[tokio::test]
    async fn test_client_errors_are_classified() {
        for kind in [
            FailureKind::ConnectionRefused,
            FailureKind::MalformedResponse,
            FailureKind::HttpError,
        ] {
            let backend = ScriptedBackend::new().script("m", vec![Step::Fail(kind)]);
            let sampler = Sampler::new(Arc::new(backend), Duration::from_secs(5));
            let sample = sampler.sample(&ModelTarget::new("m", "m"), 0, "p").await;
            assert_eq!(sample.error_detail, Some(kind));
            assert!(sample.error_message.is_some());
        }
    }
}
