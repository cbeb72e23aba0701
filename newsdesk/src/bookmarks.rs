use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

/// A saved article, as returned to clients
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: i64,
    pub user_id: i64,
    pub article_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
    pub source: Option<String>,
    pub created_at: String,
}

/// Article metadata posted by the client when saving a bookmark
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBookmark {
    pub article_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
    pub source: Option<String>,
}

const BOOKMARK_COLUMNS: &str =
    "id, user_id, article_url, title, description, url_to_image, published_at, source, created_at";

/// All bookmarks of a user, newest first.
pub async fn list_bookmarks(pool: &SqlitePool, user_id: i64) -> Result<Vec<Bookmark>> {
    let rows = sqlx::query_as::<_, Bookmark>(&format!(
        "SELECT {} FROM bookmarks WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        BOOKMARK_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to list bookmarks")?;
    Ok(rows)
}

/// Save a bookmark. Returns `None` when the user already bookmarked that URL.
pub async fn add_bookmark(
    pool: &SqlitePool,
    user_id: i64,
    article_url: &str,
    meta: &NewBookmark,
) -> Result<Option<Bookmark>> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO bookmarks
            (user_id, article_url, title, description, url_to_image, published_at, source)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(article_url)
    .bind(&meta.title)
    .bind(&meta.description)
    .bind(&meta.url_to_image)
    .bind(&meta.published_at)
    .bind(&meta.source)
    .execute(pool)
    .await
    .context("failed to insert bookmark")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    let bookmark = sqlx::query_as::<_, Bookmark>(&format!(
        "SELECT {} FROM bookmarks WHERE id = ?",
        BOOKMARK_COLUMNS
    ))
    .bind(result.last_insert_rowid())
    .fetch_one(pool)
    .await
    .context("failed to load inserted bookmark")?;

    info!("bookmarks: user {} saved {}", user_id, article_url);
    Ok(Some(bookmark))
}

/// Delete a bookmark. Returns whether one existed.
pub async fn remove_bookmark(pool: &SqlitePool, user_id: i64, article_url: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM bookmarks WHERE user_id = ? AND article_url = ?")
        .bind(user_id)
        .bind(article_url)
        .execute(pool)
        .await
        .context("failed to delete bookmark")?;
    Ok(result.rows_affected() > 0)
}
