// Hand-written stage doubles shared by the integration tests
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use newsdesk::error::PipelineError;
use newsdesk::llm::summarizer::FINAL_PROMPT;
use newsdesk::llm::{InferenceError, InferenceProvider, PartialSummary};
use newsdesk::pipeline::{PipelineConfig, SummaryPipeline};
use newsdesk::scraping::{ArticleFetcher, TextExtractor};
use newsdesk::storage::SummaryStore;

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test pool");
    common::ensure_schema(&pool).await.expect("schema");
    pool
}

pub async fn summary_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM summaries")
        .fetch_one(pool)
        .await
        .expect("count summaries")
}

/// Serves canned pages and counts calls
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, String>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl MockFetcher {
    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::Fetch(format!("no page for {url}")))
    }
}

/// Treats the fetched body as the article text; a blank body has no article.
#[derive(Default)]
pub struct PassthroughExtractor {
    pub calls: AtomicUsize,
}

impl TextExtractor for PassthroughExtractor {
    fn extract(&self, html: &str, _url: &str) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if html.trim().is_empty() {
            return Err(PipelineError::Extraction("no readable content".to_string()));
        }
        Ok(html.to_string())
    }
}

/// Replays canned answers in call order and records every prompt.
/// Once the script runs out, chunk prompts get `S<n>` and reduction prompts `FINAL`.
#[derive(Default)]
pub struct ScriptedProvider {
    answers: Mutex<VecDeque<Result<PartialSummary, InferenceError>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(answers: Vec<Result<PartialSummary, InferenceError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    async fn summarize(&self, inputs: &str) -> Result<PartialSummary, InferenceError> {
        let n = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(inputs.to_string());
            prompts.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(answer) = self.answers.lock().unwrap().pop_front() {
            return answer;
        }
        if inputs.starts_with(FINAL_PROMPT) {
            Ok(PartialSummary::Summarized("FINAL".to_string()))
        } else {
            Ok(PartialSummary::Summarized(format!("S{n}")))
        }
    }
}

pub fn text(s: &str) -> Result<PartialSummary, InferenceError> {
    Ok(PartialSummary::Summarized(s.to_string()))
}

/// A 100-char sentence ending in a period, unique per index
pub fn sentence(i: usize) -> String {
    let mut s = format!("Sentence {i} reports");
    while s.len() < 99 {
        s.push_str(" more");
    }
    s.truncate(99);
    s.push('.');
    s
}

/// `n` sentences of exactly 100 chars each, with no separators
pub fn article(n: usize) -> String {
    (0..n).map(sentence).collect()
}

pub struct Harness {
    pub pool: SqlitePool,
    pub fetcher: Arc<MockFetcher>,
    pub extractor: Arc<PassthroughExtractor>,
    pub provider: Arc<ScriptedProvider>,
    pub pipeline: SummaryPipeline,
}

pub async fn harness(
    fetcher: MockFetcher,
    provider: ScriptedProvider,
    config: PipelineConfig,
) -> Harness {
    let pool = memory_pool().await;
    let fetcher = Arc::new(fetcher);
    let extractor = Arc::new(PassthroughExtractor::default());
    let provider = Arc::new(provider);
    let pipeline = SummaryPipeline::new(
        config,
        SummaryStore::new(pool.clone()),
        fetcher.clone(),
        extractor.clone(),
        provider.clone(),
    );
    Harness {
        pool,
        fetcher,
        extractor,
        provider,
        pipeline,
    }
}

/// Local HTTP upstream that answers every request after `delay` and records the
/// highest number of requests it was serving at once.
pub struct CountingUpstream {
    pub url: String,
    peak: Arc<AtomicUsize>,
}

impl CountingUpstream {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub async fn counting_upstream(
    delay: Duration,
    content_type: &'static str,
    body: &'static str,
) -> CountingUpstream {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream");
    let addr = listener.local_addr().expect("upstream addr");
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (active_c, peak_c) = (active.clone(), peak.clone());
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let (active, peak) = (active_c.clone(), peak_c.clone());
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                // Read the head, then as many body bytes as Content-Length announces
                loop {
                    let n = match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    request.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&request).to_string();
                    if let Some(head_end) = text.find("\r\n\r\n") {
                        let body_len = text[..head_end]
                            .lines()
                            .find_map(|l| {
                                let (name, value) = l.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())
                                    .flatten()
                            })
                            .unwrap_or(0);
                        if request.len() >= head_end + 4 + body_len {
                            break;
                        }
                    }
                }

                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                active.fetch_sub(1, Ordering::SeqCst);

                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    content_type,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    CountingUpstream {
        url: format!("http://{}", addr),
        peak,
    }
}
