//! Database operations for `items`.

use chrono::{DateTime, Utc};
use opmon_core::{Item, Platform, RawItem};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
    pub id: i64,
    pub task_id: i64,
    pub platform: String,
    pub native_id: String,
    pub author: Option<String>,
    pub body: String,
    pub like_count: i32,
    pub reply_count: i32,
    pub share_count: i32,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for Item {
    type Error = DbError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Item {
            id: row.id,
            task_id: row.task_id,
            platform: row.platform.parse()?,
            native_id: row.native_id,
            author: row.author,
            body: row.body,
            like_count: row.like_count,
            reply_count: row.reply_count,
            share_count: row.share_count,
            url: row.url,
            published_at: row.published_at,
            ingested_at: row.ingested_at,
        })
    }
}

const ITEM_COLUMNS: &str = "id, task_id, platform, native_id, author, body, like_count, \
                            reply_count, share_count, url, published_at, ingested_at";

/// Inserts an item unless its `native_id` is already stored (for any task).
///
/// Returns the new row id, or `None` when the item was a duplicate. A
/// concurrent insert of the same `native_id` that loses the race also
/// yields `None`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_item_if_absent(
    pool: &PgPool,
    task_id: i64,
    platform: Platform,
    item: &RawItem,
    ingested_at: DateTime<Utc>,
) -> Result<Option<i64>, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO items \
             (task_id, platform, native_id, author, body, like_count, reply_count, \
              share_count, url, published_at, ingested_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (native_id) DO NOTHING \
         RETURNING id",
    )
    .bind(task_id)
    .bind(platform.as_str())
    .bind(item.native_id.trim())
    .bind(item.author.as_deref())
    .bind(&item.body)
    .bind(item.like_count)
    .bind(item.reply_count)
    .bind(item.share_count)
    .bind(item.url.as_deref())
    .bind(item.published_at.unwrap_or(ingested_at))
    .bind(ingested_at)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Lists a task's items, newest published first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_items(
    pool: &PgPool,
    task_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<ItemRow>, DbError> {
    let rows = sqlx::query_as::<_, ItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} FROM items \
         WHERE task_id = $1 \
         ORDER BY published_at DESC, id DESC \
         LIMIT $2 OFFSET $3"
    ))
    .bind(task_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lists up to `limit` items of a task that have no sentiment result yet.
///
/// Items with the fewest failed classification attempts come first, oldest
/// first within the same attempt count, so an item the classifier keeps
/// rejecting never starves newer ones.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_items_without_sentiment(
    pool: &PgPool,
    task_id: i64,
    limit: i64,
) -> Result<Vec<ItemRow>, DbError> {
    let rows = sqlx::query_as::<_, ItemRow>(
        "SELECT i.id, i.task_id, i.platform, i.native_id, i.author, i.body, i.like_count, \
                i.reply_count, i.share_count, i.url, i.published_at, i.ingested_at \
         FROM items i \
         LEFT JOIN sentiment_results s ON s.item_id = i.id \
         WHERE i.task_id = $1 AND s.id IS NULL \
         ORDER BY i.analysis_attempts, i.id \
         LIMIT $2",
    )
    .bind(task_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Records a failed classification attempt for an item.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the item does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_analysis_failure(
    pool: &PgPool,
    item_id: i64,
    attempted_at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE items \
         SET analysis_attempts = analysis_attempts + 1, last_analysis_at = $2 \
         WHERE id = $1",
    )
    .bind(item_id)
    .bind(attempted_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Returns the body text of every item of a task, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_item_bodies(pool: &PgPool, task_id: i64) -> Result<Vec<String>, DbError> {
    let bodies =
        sqlx::query_scalar::<_, String>("SELECT body FROM items WHERE task_id = $1 ORDER BY id")
            .bind(task_id)
            .fetch_all(pool)
            .await?;

    Ok(bodies)
}

/// Counts a task's items that already carry a sentiment result.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_items_with_sentiment(pool: &PgPool, task_id: i64) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM items i \
         JOIN sentiment_results s ON s.item_id = i.id \
         WHERE i.task_id = $1",
    )
    .bind(task_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
