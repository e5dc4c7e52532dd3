use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::ApiFlavor;
use crate::sample::FailureKind;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Other error: {0}")]
    Other(String),
}

impl ClientError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ClientError::Connection(_) => FailureKind::ConnectionRefused,
            ClientError::Http { .. } => FailureKind::HttpError,
            ClientError::Parse(_) => FailureKind::MalformedResponse,
            ClientError::Timeout(_) => FailureKind::Timeout,
            ClientError::Other(_) => FailureKind::Other,
        }
    }

    /// Errors meaning nothing is listening at the endpoint.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Connection(_) | ClientError::Timeout(_))
    }
}

/// Text and token usage returned by one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub output_tokens: u64,
    /// False when the server omitted usage and the word count was used instead
    pub tokens_reported: bool,
}

impl Completion {
    fn new(text: String, reported: Option<u64>) -> Self {
        match reported {
            Some(tokens) => Self {
                text,
                output_tokens: tokens,
                tokens_reported: true,
            },
            None => {
                let output_tokens = text.split_whitespace().count() as u64;
                Self {
                    text,
                    output_tokens,
                    tokens_reported: false,
                }
            }
        }
    }
}

/// Anything that can generate text for a model and list the models it serves.
pub trait InferenceBackend: Send + Sync + 'static {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
    ) -> impl Future<Output = Result<Completion, ClientError>> + Send;

    fn list_models(&self) -> impl Future<Output = Result<Vec<String>, ClientError>> + Send;

    /// Human readable endpoint description for logs and reports.
    fn describe(&self) -> String;
}

// Ollama native API
#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct TagEntry {
    name: String,
}

// OpenAI-compatible API
#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    completion_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Raw body of a successful response, decoded separately so that decode
/// failures classify as malformed responses.
struct ResponseBody(Vec<u8>);

impl ResponseBody {
    fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.0).map_err(|e| {
            let snippet: String = String::from_utf8_lossy(&self.0).chars().take(120).collect();
            ClientError::Parse(format!("{} (body: {})", e, snippet))
        })
    }
}

/// Configuration for creating an [`InferenceClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the endpoint (e.g. `http://localhost:11434`)
    pub base_url: String,
    pub api: ApiFlavor,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Generation cap forwarded to the server
    pub max_tokens: Option<u32>,
}

/// HTTP client for an Ollama or OpenAI-compatible inference server.
///
/// One client is built per run. Requests are never retried, so every failure
/// reaches the caller and is recorded against its sample.
///
/// # Examples
///
/// ```no_run
/// use migbench::client::{ClientConfig, InferenceBackend, InferenceClient};
/// use migbench::config::ApiFlavor;
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
///
/// let completion = client.generate("llama3.2:1b", "Hello").await?;
/// println!("{} tokens", completion.output_tokens);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: String,
    api: ApiFlavor,
    api_key: Option<String>,
    timeout: Duration,
    max_tokens: Option<u32>,
}

impl InferenceClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| ClientError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api: config.api,
            api_key: config.api_key,
            timeout: config.timeout,
            max_tokens: config.max_tokens,
        })
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url).json(body);
        if let Some(api_key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        req
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.get(&url);
        if let Some(api_key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        req
    }

    /// Send a request and return the body of a successful response.
    async fn fetch(&self, req: reqwest::RequestBuilder) -> Result<ResponseBody, ClientError> {
        let response = req.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(ClientError::Http {
                status: status.as_u16(),
                message: text,
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(ResponseBody(bytes.to_vec()))
    }

    fn classify(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else if e.is_connect() {
            ClientError::Connection(e.to_string())
        } else if e.is_decode() {
            ClientError::Parse(e.to_string())
        } else if e.is_request() || e.is_body() {
            let err_msg = e.to_string();
            if err_msg.contains("connection closed")
                || err_msg.contains("connection reset")
                || err_msg.contains("broken pipe")
                || err_msg.contains("connection refused")
            {
                ClientError::Connection(format!("Request error: {}", e))
            } else {
                ClientError::Other(format!("Request error: {}", e))
            }
        } else {
            ClientError::Other(e.to_string())
        }
    }

    async fn generate_ollama(&self, model: &str, prompt: &str) -> Result<Completion, ClientError> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: self.max_tokens.map(|num_predict| GenerateOptions { num_predict }),
        };

        let body = self.fetch(self.post("/api/generate", &request)).await?;
        let parsed: GenerateResponse = body.json()?;
        Ok(Completion::new(parsed.response, parsed.eval_count))
    }

    async fn generate_openai(&self, model: &str, prompt: &str) -> Result<Completion, ClientError> {
        let request = ChatCompletionRequest {
            model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            stream: false,
        };

        let body = self.fetch(self.post("/chat/completions", &request)).await?;
        let parsed: ChatCompletionResponse = body.json()?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Parse("response contained no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();
        Ok(Completion::new(
            text,
            parsed.usage.map(|u| u.completion_tokens),
        ))
    }
}

impl InferenceBackend for InferenceClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<Completion, ClientError> {
        match self.api {
            ApiFlavor::Ollama => self.generate_ollama(model, prompt).await,
            ApiFlavor::OpenAI => self.generate_openai(model, prompt).await,
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, ClientError> {
        match self.api {
            ApiFlavor::Ollama => {
                let body = self.fetch(self.get("/api/tags")).await?;
                let tags: TagsResponse = body.json()?;
                Ok(tags.models.into_iter().map(|m| m.name).collect())
            }
            ApiFlavor::OpenAI => {
                let body = self.fetch(self.get("/models")).await?;
                let models: ModelsResponse = body.json()?;
                Ok(models.data.into_iter().map(|m| m.id).collect())
            }
        }
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.base_url, self.api)
    }
}

/// Poll the model listing until the endpoint answers or `total_timeout` expires.
///
/// Returns the listed model names. Only used when a readiness window is
/// configured; a zero window means a single probe by the caller.
pub async fn wait_until_ready<B: InferenceBackend>(
    backend: &B,
    total_timeout: Duration,
    retry_interval: Duration,
) -> Result<Vec<String>, ClientError> {
    let start_time = Instant::now();
    let mut attempt = 0;

    log::info!("Waiting for {} to be ready...", backend.describe());

    loop {
        attempt += 1;
        log::debug!("Readiness probe attempt {}", attempt);

        let last_error = match backend.list_models().await {
            Ok(models) => {
                log::info!(
                    "Endpoint is ready ({} model{} listed after {:.1}s)",
                    models.len(),
                    if models.len() == 1 { "" } else { "s" },
                    start_time.elapsed().as_secs_f64()
                );
                return Ok(models);
            }
            Err(e) if e.is_unreachable() => e,
            // The server answered, so it is up even if the listing is unusable
            Err(e) => return Err(e),
        };

        let remaining = total_timeout.saturating_sub(start_time.elapsed());
        if remaining.is_zero() {
            return Err(last_error);
        }

        // Log progress every 30 seconds at the default interval
        if attempt % 6 == 0 {
            log::info!(
                "Still waiting for endpoint (elapsed: {:.0}s, timeout: {:.0}s)...",
                start_time.elapsed().as_secs_f64(),
                total_timeout.as_secs_f64()
            );
        }

        tokio::time::sleep(retry_interval.min(remaining)).await;
    }
}
