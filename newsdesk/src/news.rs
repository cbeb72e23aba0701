// Thin proxy over a NewsAPI-compatible service
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2";

/// Response envelope handed back to clients. The HTTP status is always 200;
/// `status` carries the outcome.
#[derive(Debug, Clone, Serialize)]
pub struct NewsEnvelope {
    pub status: u16,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NewsEnvelope {
    fn from_payload(payload: Value) -> Self {
        let total = payload
            .get("totalResults")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        if total > 0 {
            Self {
                status: 200,
                success: true,
                message: "Successfully fetched the data".to_string(),
                data: Some(payload),
                error: None,
            }
        } else {
            Self {
                status: 200,
                success: true,
                message: "No more results to show".to_string(),
                data: None,
                error: None,
            }
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: 500,
            success: false,
            message: "Failed to fetch data from the API".to_string(),
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Paging parameters shared by every listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    /// Missing or zero values fall back to page 1 and `default_size`.
    pub fn resolve(page: Option<u32>, page_size: Option<u32>, default_size: u32) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            page_size: page_size.filter(|s| *s > 0).unwrap_or(default_size),
        }
    }
}

pub struct NewsApiClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl NewsApiClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("newsdesk/0.1")
            .build()
            .context("failed to build news api client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    /// Full-text search across all sources
    pub async fn everything(&self, query: &str, page: Page) -> NewsEnvelope {
        self.get(
            "everything",
            &[
                ("q", query.to_string()),
                ("page", page.page.to_string()),
                ("pageSize", page.page_size.to_string()),
            ],
        )
        .await
    }

    /// English headlines for a category
    pub async fn top_headlines(&self, category: &str, page: Page) -> NewsEnvelope {
        self.get(
            "top-headlines",
            &[
                ("category", category.to_string()),
                ("language", "en".to_string()),
                ("page", page.page.to_string()),
                ("pageSize", page.page_size.to_string()),
            ],
        )
        .await
    }

    /// Headlines for a two-letter country code
    pub async fn country(&self, iso: &str, page: Page) -> NewsEnvelope {
        self.get(
            "top-headlines",
            &[
                ("country", iso.to_string()),
                ("page", page.page.to_string()),
                ("pageSize", page.page_size.to_string()),
            ],
        )
        .await
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> NewsEnvelope {
        match self.fetch_json(endpoint, params).await {
            Ok(payload) => NewsEnvelope::from_payload(payload),
            Err(e) => {
                error!("news: {} request failed: {:#}", endpoint, e);
                NewsEnvelope::failure(e.to_string())
            }
        }
    }

    async fn fetch_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, endpoint);
        info!("news: GET {} {:?}", url, params);

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await
            .context("news api request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Request failed with status code {}", status.as_u16());
        }

        response
            .json::<Value>()
            .await
            .context("news api returned invalid JSON")
    }
}
