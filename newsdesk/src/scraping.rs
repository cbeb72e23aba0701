use anyhow::{Context, Result};
use reqwest::Client;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::PipelineError;

/// Retrieves the raw HTML of an article page
#[async_trait::async_trait]
pub trait ArticleFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, PipelineError>;
}

/// Isolates the main article text of an HTML page
pub trait TextExtractor: Send + Sync {
    fn extract(&self, html: &str, url: &str) -> Result<String, PipelineError>;
}

/// Plain HTTP GET fetcher with a request timeout, a body size cap and a cap on
/// concurrent fetches.
pub struct HttpArticleFetcher {
    client: Client,
    limiter: Arc<Semaphore>,
    max_response_bytes: u64,
}

impl HttpArticleFetcher {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            limiter: Arc::new(Semaphore::new(8)),
            max_response_bytes: 5 * 1024 * 1024,
        })
    }

    pub fn with_limits(mut self, max_concurrent_requests: usize, max_response_bytes: u64) -> Self {
        self.limiter = Arc::new(Semaphore::new(max_concurrent_requests.max(1)));
        self.max_response_bytes = max_response_bytes;
        self
    }
}

#[async_trait::async_trait]
impl ArticleFetcher for HttpArticleFetcher {
    async fn fetch(&self, url: &str) -> Result<String, PipelineError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| PipelineError::Fetch("fetcher is shut down".to_string()))?;

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Fetch(format!(
                "article fetch failed with status: {}",
                status
            )));
        }

        if let Some(content_type) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_text_content_type(content_type) {
                return Err(PipelineError::Fetch(format!(
                    "unsupported content type: {}",
                    content_type
                )));
            }
        }

        if let Some(len) = response.content_length() {
            if len > self.max_response_bytes {
                return Err(PipelineError::Fetch(format!(
                    "article too large ({} bytes)",
                    len
                )));
            }
        }

        // Chunked responses carry no length; stop reading once the cap is passed.
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PipelineError::Fetch(format!("failed to read response body: {}", e)))?
        {
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > self.max_response_bytes {
                return Err(PipelineError::Fetch(format!(
                    "article too large (over {} bytes)",
                    self.max_response_bytes
                )));
            }
        }

        debug!("scraping: fetched {} bytes from {}", bytes.len(), url);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn is_text_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/") || mime.contains("html") || mime.contains("xml")
}

/// Readability-based extractor. The page URL is the base for resolving relative links,
/// which the scoring heuristic relies on.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadabilityExtractor;

impl TextExtractor for ReadabilityExtractor {
    fn extract(&self, html: &str, url: &str) -> Result<String, PipelineError> {
        let url_obj = url::Url::parse(url)
            .map_err(|e| PipelineError::Extraction(format!("invalid article URL: {}", e)))?;

        let mut reader = Cursor::new(html.as_bytes());
        let product = readability::extractor::extract(&mut reader, &url_obj).map_err(|e| {
            warn!("scraping: readability failed for {}: {}", url, e);
            PipelineError::Extraction(e.to_string())
        })?;

        let text = product.text.trim();
        if text.is_empty() {
            return Err(PipelineError::Extraction(
                "no readable article body found".to_string(),
            ));
        }

        info!("scraping: readability extracted {} chars from {}", text.len(), url);
        Ok(text.to_string())
    }
}
