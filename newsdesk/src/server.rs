use std::sync::Arc;

use anyhow::{anyhow, Result};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::response::status::Custom;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{catch, catchers, delete, get, post, routes, Build, FromForm, Rocket, State};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use common::ServerConfig;

use crate::accounts::{self, TokenSigner};
use crate::bookmarks::{self, Bookmark, NewBookmark};
use crate::error::PipelineError;
use crate::news::{NewsApiClient, NewsEnvelope, Page};
use crate::pipeline::{PipelineRequest, SummaryPipeline};

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub pipeline: Arc<SummaryPipeline>,
    pub tokens: TokenSigner,
    /// `None` when no news API key is configured
    pub news: Option<Arc<NewsApiClient>>,
}

/// JSON error response with an explicit status
#[derive(Debug)]
pub struct ApiError {
    status: Status,
    body: Value,
}

impl ApiError {
    fn message(status: Status, message: &str) -> Self {
        Self {
            status,
            body: json!({ "message": message }),
        }
    }

    fn server_error() -> Self {
        Self::message(Status::InternalServerError, "Server error")
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = if err.is_client_error() {
            Status::BadRequest
        } else if matches!(err, PipelineError::Timeout) {
            Status::GatewayTimeout
        } else {
            Status::InternalServerError
        };

        if status == Status::BadRequest {
            warn!("summarize: {}", err);
        } else {
            error!("summarize: {}", err);
        }

        // Database errors stay in the log.
        let message = match &err {
            PipelineError::Storage(_) => "Summary storage failed".to_string(),
            other => other.to_string(),
        };
        let mut body = json!({ "error": message });
        if let PipelineError::Summarization {
            details: Some(details),
            ..
        } = err
        {
            body["details"] = details;
        }
        Self { status, body }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        Custom(self.status, Json(self.body)).respond_to(req)
    }
}

/// Authenticated caller, resolved from an `Authorization: Bearer <jwt>` header.
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

/// Why the auth guard rejected a request, read back by the 401 catcher
struct AuthFailure(&'static str);

fn reject(req: &Request<'_>, message: &'static str) -> Outcome<AuthUser, &'static str> {
    req.local_cache(|| AuthFailure(message));
    Outcome::Error((Status::Unauthorized, message))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = &'static str;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(header) = req.headers().get_one("Authorization") else {
            return reject(req, "Access denied. No token provided.");
        };

        let mut parts = header.split_whitespace();
        let token = match (parts.next(), parts.next()) {
            (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("bearer") => token,
            _ => return reject(req, "Access denied. Token malformed."),
        };

        let Some(state) = req.rocket().state::<AppState>() else {
            error!("auth: application state missing");
            return Outcome::Error((Status::InternalServerError, "state missing"));
        };

        match state.tokens.verify(token) {
            Ok(claims) => Outcome::Success(AuthUser {
                id: claims.sub,
                username: claims.username,
            }),
            Err(e) => {
                warn!("auth: rejected token: {}", e);
                reject(req, "Invalid token.")
            }
        }
    }
}

#[catch(401)]
fn unauthorized(req: &Request) -> Custom<Json<Value>> {
    let AuthFailure(message) = req.local_cache(|| AuthFailure("Access denied."));
    Custom(
        Status::Unauthorized,
        Json(json!({ "success": false, "message": message })),
    )
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> Custom<Json<Value>> {
    Custom(status, Json(json!({ "error": status.reason_lossy() })))
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

#[derive(Deserialize)]
struct SummarizeRequest {
    url: Option<String>,
}

/// Summarize the article at `url`, serving the cached summary when there is one.
#[post("/api/summarize", data = "<body>")]
async fn summarize(
    state: &State<AppState>,
    body: Json<SummarizeRequest>,
) -> Result<Json<Value>, ApiError> {
    let url = body.into_inner().url.unwrap_or_default();
    let cancel = CancellationToken::new();
    // Fires when the handler future is dropped, e.g. the client went away.
    let _cancel_on_drop = cancel.clone().drop_guard();

    let summary = state.pipeline.run(PipelineRequest { url }, &cancel).await?;
    Ok(Json(json!({ "summary": summary })))
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn session_response(state: &AppState, user: &accounts::User) -> Result<Value, ApiError> {
    let token = state.tokens.issue(user).map_err(|e| {
        error!("failed to create jwt: {}", e);
        ApiError::server_error()
    })?;
    Ok(json!({ "token": token, "user": user }))
}

/// Register endpoint: create a user with a hashed password and return a JWT.
#[post("/api/auth/register", data = "<body>")]
async fn register(
    state: &State<AppState>,
    body: Json<RegisterRequest>,
) -> Result<Custom<Json<Value>>, ApiError> {
    let body = body.into_inner();
    let (Some(username), Some(email), Some(password)) = (
        non_blank(body.username),
        non_blank(body.email),
        non_blank(body.password),
    ) else {
        return Err(ApiError::message(Status::BadRequest, "Please enter all fields"));
    };

    let user = accounts::register_user(&state.db, &username, &email, &password)
        .await
        .map_err(|e| {
            error!("register failed: {:#}", e);
            ApiError::server_error()
        })?
        .ok_or_else(|| ApiError::message(Status::BadRequest, "User already exists"))?;

    Ok(Custom(Status::Created, Json(session_response(state, &user)?)))
}

/// Login endpoint: verify the password and return a JWT.
#[post("/api/auth/login", data = "<body>")]
async fn login(state: &State<AppState>, body: Json<LoginRequest>) -> Result<Json<Value>, ApiError> {
    let body = body.into_inner();
    let (Some(email), Some(password)) = (non_blank(body.email), non_blank(body.password)) else {
        return Err(ApiError::message(Status::BadRequest, "Please enter all fields"));
    };

    let user = accounts::authenticate(&state.db, &email, &password)
        .await
        .map_err(|e| {
            error!("db error on login: {:#}", e);
            ApiError::server_error()
        })?
        .ok_or_else(|| ApiError::message(Status::BadRequest, "Invalid credentials"))?;

    Ok(Json(session_response(state, &user)?))
}

#[get("/api/protected")]
async fn protected(user: AuthUser) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": format!("Hello, {}! You have accessed a protected route.", user.username),
    }))
}

#[get("/api/bookmarks")]
async fn list_bookmarks(
    state: &State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Bookmark>>, ApiError> {
    let rows = bookmarks::list_bookmarks(&state.db, user.id)
        .await
        .map_err(|e| {
            error!("bookmark fetch error: {:#}", e);
            ApiError {
                status: Status::InternalServerError,
                body: json!({ "error": "Failed to fetch bookmarks" }),
            }
        })?;
    Ok(Json(rows))
}

#[post("/api/bookmarks", data = "<body>")]
async fn add_bookmark(
    state: &State<AppState>,
    user: AuthUser,
    body: Json<NewBookmark>,
) -> Result<Json<Bookmark>, ApiError> {
    let body = body.into_inner();
    let Some(article_url) = non_blank(body.article_url.clone()) else {
        return Err(ApiError::message(Status::BadRequest, "articleUrl is required"));
    };

    let saved = bookmarks::add_bookmark(&state.db, user.id, &article_url, &body)
        .await
        .map_err(|e| {
            error!("bookmark insert error: {:#}", e);
            ApiError::server_error()
        })?
        .ok_or_else(|| ApiError::message(Status::BadRequest, "Already bookmarked"))?;
    Ok(Json(saved))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveBookmark {
    article_url: Option<String>,
}

#[delete("/api/bookmarks", data = "<body>")]
async fn remove_bookmark(
    state: &State<AppState>,
    user: AuthUser,
    body: Json<RemoveBookmark>,
) -> Result<Json<Value>, ApiError> {
    let Some(article_url) = non_blank(body.into_inner().article_url) else {
        return Err(ApiError::message(Status::BadRequest, "articleUrl is required"));
    };

    bookmarks::remove_bookmark(&state.db, user.id, &article_url)
        .await
        .map_err(|e| {
            error!("bookmark delete error: {:#}", e);
            ApiError::server_error()
        })?;
    Ok(Json(json!({ "message": "Bookmark removed" })))
}

#[derive(FromForm)]
struct Paging {
    page: Option<u32>,
    #[field(name = "pageSize")]
    page_size: Option<u32>,
}

fn news_client(state: &AppState) -> Result<&NewsApiClient, NewsEnvelope> {
    state
        .news
        .as_deref()
        .ok_or_else(|| NewsEnvelope::failure("News API key is not configured"))
}

#[get("/all-news?<q>&<paging..>")]
async fn all_news(state: &State<AppState>, q: Option<String>, paging: Paging) -> Json<NewsEnvelope> {
    let client = match news_client(state) {
        Ok(c) => c,
        Err(envelope) => return Json(envelope),
    };
    let query = non_blank(q).unwrap_or_else(|| "latest".to_string());
    let page = Page::resolve(paging.page, paging.page_size, 40);
    Json(client.everything(&query, page).await)
}

#[get("/top-headlines?<category>&<paging..>")]
async fn top_headlines(
    state: &State<AppState>,
    category: Option<String>,
    paging: Paging,
) -> Json<NewsEnvelope> {
    let client = match news_client(state) {
        Ok(c) => c,
        Err(envelope) => return Json(envelope),
    };
    let category = non_blank(category).unwrap_or_else(|| "business".to_string());
    let page = Page::resolve(paging.page, paging.page_size, 80);
    Json(client.top_headlines(&category, page).await)
}

#[get("/country/<iso>?<paging..>")]
async fn country(state: &State<AppState>, iso: &str, paging: Paging) -> Json<NewsEnvelope> {
    let client = match news_client(state) {
        Ok(c) => c,
        Err(envelope) => return Json(envelope),
    };
    let page = Page::resolve(paging.page, paging.page_size, 80);
    Json(client.country(iso, page).await)
}

/// Assemble the Rocket instance: managed state, routes, catchers, and `[server]`
/// bind/port merged over Rocket's own configuration sources.
pub fn build_rocket(state: AppState, server: Option<&ServerConfig>) -> Rocket<Build> {
    let mut fig = rocket::Config::figment();
    if let Some(server) = server {
        if let Some(bind) = &server.bind {
            fig = fig.merge(("address", bind.clone()));
        }
        if let Some(port) = server.port {
            fig = fig.merge(("port", port));
        }
    }

    rocket::custom(fig)
        .manage(state)
        .mount(
            "/",
            routes![
                health,
                summarize,
                register,
                login,
                protected,
                list_bookmarks,
                add_bookmark,
                remove_bookmark,
                all_news,
                top_headlines,
                country,
            ],
        )
        .register("/", catchers![unauthorized, default_catcher])
}

/// Launch the HTTP server. Blocks until Rocket shuts down (SIGINT/SIGTERM).
pub async fn launch_rocket(state: AppState, server: Option<&ServerConfig>) -> Result<()> {
    info!("Starting Rocket HTTP server");
    build_rocket(state, server)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    info!("Rocket HTTP server has shut down");
    Ok(())
}
