use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort a benchmark run.
///
/// Per-sample failures never show up here; they are recorded on the
/// [`Sample`](crate::sample::Sample) itself.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Inference endpoint {endpoint} is unreachable: {reason}")]
    EndpointUnreachable { endpoint: String, reason: String },

    #[error("Cannot list models at {endpoint}: {reason}")]
    ModelListing { endpoint: String, reason: String },

    #[error("Cannot write report to {}: {source}", path.display())]
    Render {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BenchError {
    pub fn render(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::Render {
            path: path.into(),
            source,
        }
    }

    /// True for errors raised before any sample was taken.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BenchError::Configuration(_)
                | BenchError::EndpointUnreachable { .. }
                | BenchError::ModelListing { .. }
        )
    }
}
