use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::{InferenceError, InferenceProvider, PartialSummary};

/// Remote summarization model behind a hosted inference HTTP API.
///
/// Requests are `POST {"inputs": "..."}` with a bearer token; a successful answer is an
/// array whose first element carries `summary_text`.
pub struct RemoteInferenceProvider {
    api_url: String,
    api_key: String,
    default_timeout: Duration,
    limiter: Arc<Semaphore>,
    client: reqwest::Client,
}

impl RemoteInferenceProvider {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            default_timeout: Duration::from_secs(60),
            limiter: Arc::new(Semaphore::new(4)),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_defaults(mut self, timeout_secs: u64, max_concurrent_requests: usize) -> Self {
        self.default_timeout = Duration::from_secs(timeout_secs);
        self.limiter = Arc::new(Semaphore::new(max_concurrent_requests.max(1)));
        self
    }

    async fn post(&self, inputs: &str) -> Result<(reqwest::StatusCode, String), InferenceError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&InferenceRequest { inputs })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait::async_trait]
impl InferenceProvider for RemoteInferenceProvider {
    async fn summarize(&self, inputs: &str) -> Result<PartialSummary, InferenceError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| InferenceError::Closed)?;

        let (status, body) = tokio::time::timeout(self.default_timeout, self.post(inputs))
            .await
            .map_err(|_| InferenceError::Timeout)??;

        parse_inference_response(status, &body)
    }
}

/// Interpret an inference response body.
///
/// An `error` field wins over the HTTP status, since the API reports model loading and
/// quota problems that way. A well-formed success without `summary_text` is `Empty`.
fn parse_inference_response(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<PartialSummary, InferenceError> {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            if !status.is_success() {
                return Err(InferenceError::Status {
                    status: status.as_u16(),
                    body: body.to_string(),
                });
            }
            return Err(InferenceError::Malformed(e.to_string()));
        }
    };

    if let Some(detail) = value.get("error") {
        return Err(InferenceError::Upstream {
            detail: detail.clone(),
        });
    }

    if !status.is_success() {
        return Err(InferenceError::Status {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    let first = serde_json::from_value::<Vec<SummaryItem>>(value)
        .ok()
        .and_then(|items| items.into_iter().next());

    Ok(PartialSummary::from_text(
        first.as_ref().and_then(|item| item.summary_text.as_deref()),
    ))
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
struct SummaryItem {
    #[serde(default)]
    summary_text: Option<String>,
}
