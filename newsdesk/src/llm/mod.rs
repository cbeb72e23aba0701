use thiserror::Error;

/// Core trait for summarization inference backends
#[async_trait::async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Submit one prompt-wrapped input and return the model's summary text
    async fn summarize(&self, inputs: &str) -> Result<PartialSummary, InferenceError>;
}

/// Outcome of one inference call that did not fail.
///
/// `Empty` means the upstream answered without usable `summary_text`; it is kept apart
/// from real text so the reducer can tell the two cases apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialSummary {
    Summarized(String),
    Empty,
}

impl PartialSummary {
    pub fn from_text(text: Option<&str>) -> Self {
        match text.map(str::trim) {
            Some(t) if !t.is_empty() => PartialSummary::Summarized(t.to_string()),
            _ => PartialSummary::Empty,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            PartialSummary::Summarized(t) => Some(t),
            PartialSummary::Empty => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum InferenceError {
    /// The response body carried an `error` field
    #[error("inference API reported an error: {detail}")]
    Upstream { detail: serde_json::Value },

    #[error("inference API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("inference request timed out")]
    Timeout,

    #[error("inference HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to parse inference response: {0}")]
    Malformed(String),

    #[error("inference client is shut down")]
    Closed,
}

pub mod remote;
pub mod summarizer;
