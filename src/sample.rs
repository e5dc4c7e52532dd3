use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Maximum number of characters kept from a response for the report preview.
pub const PREVIEW_CHARS: usize = 200;

/// Logical name of a benchmarked model (e.g. "small"), the grouping key of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Classification of a failed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureKind {
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "connection-refused")]
    ConnectionRefused,
    #[serde(rename = "malformed-response")]
    MalformedResponse,
    #[serde(rename = "http-error")]
    HttpError,
    /// The overall deadline expired before or during the attempt
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "other")]
    Other,
}

impl FailureKind {
    pub const ALL: [FailureKind; 6] = [
        FailureKind::Timeout,
        FailureKind::ConnectionRefused,
        FailureKind::MalformedResponse,
        FailureKind::HttpError,
        FailureKind::Cancelled,
        FailureKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ConnectionRefused => "connection-refused",
            FailureKind::MalformedResponse => "malformed-response",
            FailureKind::HttpError => "http-error",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One timed inference call.
///
/// Samples are created once by the sampler (or the runner, for attempts the
/// deadline cut off) and are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub model: ModelId,
    pub repetition: usize,
    pub prompt: String,
    #[serde(rename = "elapsed_ms", serialize_with = "duration_ms::serialize")]
    pub elapsed: Duration,
    pub output_tokens: u64,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl Sample {
    pub fn success(
        model: ModelId,
        repetition: usize,
        prompt: &str,
        elapsed: Duration,
        output_tokens: u64,
        text: &str,
    ) -> Self {
        Self {
            model,
            repetition,
            prompt: prompt.to_string(),
            elapsed,
            output_tokens,
            succeeded: true,
            error_detail: None,
            error_message: None,
            preview: Some(preview(text)),
        }
    }

    pub fn failure(
        model: ModelId,
        repetition: usize,
        prompt: &str,
        elapsed: Duration,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            model,
            repetition,
            prompt: prompt.to_string(),
            elapsed,
            output_tokens: 0,
            succeeded: false,
            error_detail: Some(kind),
            error_message: Some(message.into()),
            preview: None,
        }
    }

    pub fn tokens_per_second(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (self.succeeded && secs > 0.0).then(|| self.output_tokens as f64 / secs)
    }
}

/// Serialize durations as fractional milliseconds in reports.
pub(crate) mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    fn millis(duration: &Duration) -> f64 {
        duration.as_secs_f64() * 1000.0
    }

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(millis(duration))
    }

    pub fn serialize_option<S: Serializer>(
        duration: &Option<Duration>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => s.serialize_some(&millis(d)),
            None => s.serialize_none(),
        }
    }
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > PREVIEW_CHARS {
        let cut: String = trimmed.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        trimmed.to_string()
    }
}
