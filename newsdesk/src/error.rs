use thiserror::Error;

use crate::llm::InferenceError;

/// Failure of one summarization run. Every variant aborts the pipeline; nothing is
/// cached when one is returned.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No URL provided")]
    MissingInput,

    #[error("Failed to fetch article: {0}")]
    Fetch(String),

    #[error("Failed to extract article content: {0}")]
    Extraction(String),

    #[error("{message}")]
    Summarization {
        message: String,
        /// Upstream error payload, passed through to the caller as `details`
        details: Option<serde_json::Value>,
    },

    #[error("Summary cache error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Summarization timed out")]
    Timeout,

    #[error("Summarization cancelled")]
    Cancelled,
}

impl PipelineError {
    pub(crate) fn summarization(message: impl Into<String>, source: InferenceError) -> Self {
        let details = match source {
            InferenceError::Upstream { detail } => Some(detail),
            other => Some(serde_json::Value::String(other.to_string())),
        };
        PipelineError::Summarization {
            message: message.into(),
            details,
        }
    }

    /// Input and extraction problems are the caller's to fix; everything else is ours
    /// or an upstream's.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::MissingInput | PipelineError::Extraction(_))
    }
}
