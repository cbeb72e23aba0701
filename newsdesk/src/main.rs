/*
newsdesk - single-binary main.rs
Loads configuration, prepares the database and the summarization pipeline, then serves the
HTTP API until shutdown.
*/

use anyhow::Result;
use clap::Parser;
use common::{init_db_pool, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use newsdesk::accounts::TokenSigner;
use newsdesk::llm::remote::RemoteInferenceProvider;
use newsdesk::news::{self, NewsApiClient};
use newsdesk::pipeline::{PipelineConfig, SummaryPipeline};
use newsdesk::scraping::{HttpArticleFetcher, ReadabilityExtractor};
use newsdesk::server::{launch_rocket, AppState};
use newsdesk::storage::SummaryStore;

const DEFAULT_INFERENCE_URL: &str =
    "https://api-inference.huggingface.co/models/pszemraj/led-large-book-summary";
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; newsdesk/0.1; +https://github.com/newsdesk)";

#[derive(Parser, Debug)]
#[command(name = "newsdesk", about = "Newsdesk news and article summary server")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Read a secret from the environment variable named in config.
fn secret_from_env(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // .env is optional; real environment variables take precedence
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    let config = match Config::load_with_defaults(
        if default_path.exists() {
            Some(&default_path)
        } else {
            None
        },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    let db_pool = match init_db_pool(&config.database.path).await {
        Ok(p) => p,
        Err(e) => {
            error!(%e, db_path = %config.database.path, "failed to initialize database pool");
            return Err(e);
        }
    };
    common::ensure_schema(&db_pool).await?;
    info!(db_path = %config.database.path, "database ready");

    // Article fetching
    let fetch_cfg = config.fetch.clone().unwrap_or_default();
    let fetcher = HttpArticleFetcher::new(
        fetch_cfg.timeout_seconds.unwrap_or(15),
        fetch_cfg.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT),
    )?
    .with_limits(
        fetch_cfg.max_concurrent_requests.unwrap_or(8),
        fetch_cfg.max_response_bytes.unwrap_or(5 * 1024 * 1024),
    );

    // Inference
    let summarizer_cfg = config.summarizer.clone().unwrap_or_default();
    let api_url = summarizer_cfg
        .api_url
        .clone()
        .unwrap_or_else(|| DEFAULT_INFERENCE_URL.to_string());
    let key_env = summarizer_cfg
        .api_key_env
        .clone()
        .unwrap_or_else(|| "HUGGINGFACE_API_KEY".to_string());
    let api_key = secret_from_env(&key_env).unwrap_or_else(|| {
        warn!("inference API key env var '{}' not set; summarization requests will be rejected upstream", key_env);
        String::new()
    });
    let provider = RemoteInferenceProvider::new(api_url.clone(), api_key).with_defaults(
        summarizer_cfg.timeout_seconds.unwrap_or(60),
        summarizer_cfg.max_concurrent_requests.unwrap_or(4),
    );
    info!("inference provider initialized at {}", api_url);

    let pipeline = SummaryPipeline::new(
        PipelineConfig::from_config(config.summarizer.as_ref()),
        SummaryStore::new(db_pool.clone()),
        Arc::new(fetcher),
        Arc::new(ReadabilityExtractor),
        Arc::new(provider),
    );

    // Auth
    let auth_cfg = config.auth.clone().unwrap_or_default();
    let secret_env = auth_cfg
        .jwt_secret_env
        .unwrap_or_else(|| "JWT_SECRET".to_string());
    let jwt_secret = secret_from_env(&secret_env).unwrap_or_else(|| {
        warn!("JWT secret env var '{}' not set; using an insecure development secret", secret_env);
        "dev-secret".to_string()
    });
    let tokens = TokenSigner::new(jwt_secret, auth_cfg.token_ttl_hours.unwrap_or(24));

    // News API
    let news_cfg = config.news_api.clone().unwrap_or_default();
    let news_env = news_cfg
        .api_key_env
        .clone()
        .unwrap_or_else(|| "NEWS_API_KEY".to_string());
    let news = match secret_from_env(&news_env) {
        Some(key) => Some(Arc::new(NewsApiClient::new(
            news_cfg.base_url.as_deref().unwrap_or(news::DEFAULT_BASE_URL),
            &key,
            news_cfg.timeout_seconds.unwrap_or(15),
        )?)),
        None => {
            warn!("news API key env var '{}' not set; news endpoints will report failures", news_env);
            None
        }
    };

    let state = AppState {
        db: db_pool,
        pipeline: Arc::new(pipeline),
        tokens,
        news,
    };

    if let Err(e) = launch_rocket(state, config.server.as_ref()).await {
        error!(%e, "HTTP server failed");
        return Err(e);
    }

    info!("shutdown complete");
    Ok(())
}
