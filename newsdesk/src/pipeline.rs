use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::SummarizerConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chunking::{
    normalize_whitespace, summarizable_chunks, DEFAULT_MAX_CHUNK_LENGTH, DEFAULT_MIN_CHUNK_LENGTH,
};
use crate::error::PipelineError;
use crate::llm::{summarizer, InferenceProvider};
use crate::scraping::{ArticleFetcher, TextExtractor};
use crate::storage::SummaryStore;

/// Tunables of a summarization run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_chunk_length: usize,
    pub min_chunk_length: usize,
    pub chunk_concurrency: usize,
    /// Deadline for a whole run, cache lookup through cache write
    pub timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
            min_chunk_length: DEFAULT_MIN_CHUNK_LENGTH,
            chunk_concurrency: 1,
            timeout: Duration::from_secs(120),
        }
    }
}

impl PipelineConfig {
    pub fn from_config(cfg: Option<&SummarizerConfig>) -> Self {
        let defaults = Self::default();
        let Some(cfg) = cfg else {
            return defaults;
        };
        Self {
            max_chunk_length: cfg.max_chunk_length.unwrap_or(defaults.max_chunk_length),
            min_chunk_length: cfg.min_chunk_length.unwrap_or(defaults.min_chunk_length),
            chunk_concurrency: cfg.chunk_concurrency.unwrap_or(defaults.chunk_concurrency),
            timeout: cfg
                .pipeline_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// One summarization request
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub url: String,
}

/// Cache lookup, fetch, extraction, chunking, map-reduce summarization and cache write,
/// run in that order for each request.
pub struct SummaryPipeline {
    config: PipelineConfig,
    store: SummaryStore,
    fetcher: Arc<dyn ArticleFetcher>,
    extractor: Arc<dyn TextExtractor>,
    provider: Arc<dyn InferenceProvider>,
}

impl SummaryPipeline {
    pub fn new(
        config: PipelineConfig,
        store: SummaryStore,
        fetcher: Arc<dyn ArticleFetcher>,
        extractor: Arc<dyn TextExtractor>,
        provider: Arc<dyn InferenceProvider>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            extractor,
            provider,
        }
    }

    pub fn store(&self) -> &SummaryStore {
        &self.store
    }

    /// Produce the summary for `request.url`, from cache when possible.
    ///
    /// The run stops with `Timeout` once the configured deadline passes and with
    /// `Cancelled` as soon as `cancel` fires. Nothing is cached unless every stage
    /// succeeded.
    pub async fn run(
        &self,
        request: PipelineRequest,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        if request.url.trim().is_empty() {
            return Err(PipelineError::MissingInput);
        }

        match tokio::time::timeout(self.config.timeout, self.run_stages(&request.url, cancel)).await
        {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout),
        }
    }

    async fn run_stages(&self, url: &str, cancel: &CancellationToken) -> Result<String, PipelineError> {
        if let Some(record) = guarded(cancel, async { Ok(self.store.lookup(url).await?) }).await? {
            info!("pipeline: using cached summary for {}", url);
            return Ok(record.summary);
        }

        let html = guarded(cancel, self.fetcher.fetch(url)).await?;
        let text = guarded(cancel, self.extract(html, url)).await?;

        let chunks = summarizable_chunks(
            &text,
            self.config.max_chunk_length,
            self.config.min_chunk_length,
        );
        info!("pipeline: {} chunks to summarize for {}", chunks.len(), url);

        let summary = if chunks.is_empty() {
            // Too short to be worth a model call; the article text is its own summary.
            normalize_whitespace(&text)
        } else {
            guarded(
                cancel,
                summarizer::summarize_chunks(
                    self.provider.as_ref(),
                    &chunks,
                    self.config.chunk_concurrency,
                ),
            )
            .await?
        };

        let record = guarded(cancel, async {
            Ok(self.store.insert_if_absent(url, &summary).await?)
        })
        .await?;
        Ok(record.summary)
    }

    /// Readability parsing is CPU-bound and runs on the blocking pool.
    async fn extract(&self, html: String, url: &str) -> Result<String, PipelineError> {
        let extractor = Arc::clone(&self.extractor);
        let url = url.to_string();
        tokio::task::spawn_blocking(move || extractor.extract(&html, &url))
            .await
            .map_err(|e| PipelineError::Extraction(format!("extraction task failed: {}", e)))?
    }
}

/// Race one stage against the cancellation token.
async fn guarded<T>(
    cancel: &CancellationToken,
    stage: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = stage => result,
    }
}
