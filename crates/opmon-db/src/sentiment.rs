//! Database operations for the `sentiment_results` table.

use chrono::{DateTime, Utc};
use opmon_core::{ClassifiedItem, CoreError, Item, Sentiment};
use rust_decimal::prelude::*;
use sqlx::PgPool;

use crate::{DbError, ItemRow};

/// A row from the `sentiment_results` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SentimentResultRow {
    pub id: i64,
    pub item_id: i64,
    pub label: String,
    pub score: Decimal,
    pub confidence: Decimal,
    pub analyzed_at: DateTime<Utc>,
}

impl TryFrom<SentimentResultRow> for Sentiment {
    type Error = DbError;

    fn try_from(row: SentimentResultRow) -> Result<Self, Self::Error> {
        let score = row.score.to_f64().unwrap_or_default();
        let confidence = row.confidence.to_f64().unwrap_or_default();
        Ok(Sentiment::new(row.label.parse()?, score, confidence)?)
    }
}

/// An item row joined with its sentiment result.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClassifiedItemRow {
    #[sqlx(flatten)]
    pub item: ItemRow,
    pub label: String,
    pub score: Decimal,
    pub confidence: Decimal,
    pub analyzed_at: DateTime<Utc>,
}

impl TryFrom<ClassifiedItemRow> for ClassifiedItem {
    type Error = DbError;

    fn try_from(row: ClassifiedItemRow) -> Result<Self, Self::Error> {
        let score = row.score.to_f64().unwrap_or_default();
        let confidence = row.confidence.to_f64().unwrap_or_default();
        Ok(ClassifiedItem {
            item: Item::try_from(row.item)?,
            sentiment: Sentiment::new(row.label.parse()?, score, confidence)?,
            analyzed_at: row.analyzed_at,
        })
    }
}

/// Converts a unit-interval value to the 4-decimal `NUMERIC(5,4)` representation.
pub(crate) fn unit_decimal(field: &'static str, value: f64) -> Result<Decimal, DbError> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(4))
        .ok_or(DbError::Decode(CoreError::OutOfUnitRange { field, value }))
}

/// Stores the sentiment for an item unless one already exists.
///
/// Returns `true` when a row was written. Existing results are never
/// overwritten.
///
/// # Errors
///
/// Returns [`DbError::Decode`] if a value cannot be represented, or
/// [`DbError::Sqlx`] if the insert fails.
pub async fn insert_sentiment_result(
    pool: &PgPool,
    item_id: i64,
    sentiment: &Sentiment,
) -> Result<bool, DbError> {
    let score = unit_decimal("score", sentiment.score)?;
    let confidence = unit_decimal("confidence", sentiment.confidence)?;

    let result = sqlx::query(
        "INSERT INTO sentiment_results (item_id, label, score, confidence) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (item_id) DO NOTHING",
    )
    .bind(item_id)
    .bind(sentiment.label.as_str())
    .bind(score)
    .bind(confidence)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Fetches the sentiment result for an item, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_sentiment_result(
    pool: &PgPool,
    item_id: i64,
) -> Result<Option<SentimentResultRow>, DbError> {
    let row = sqlx::query_as::<_, SentimentResultRow>(
        "SELECT id, item_id, label, score, confidence, analyzed_at \
         FROM sentiment_results \
         WHERE item_id = $1",
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Lists a task's classified items, most recently analyzed first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_classified_items(
    pool: &PgPool,
    task_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<ClassifiedItemRow>, DbError> {
    let rows = sqlx::query_as::<_, ClassifiedItemRow>(
        "SELECT i.id, i.task_id, i.platform, i.native_id, i.author, i.body, i.like_count, \
                i.reply_count, i.share_count, i.url, i.published_at, i.ingested_at, \
                s.label, s.score, s.confidence, s.analyzed_at \
         FROM sentiment_results s \
         JOIN items i ON i.id = s.item_id \
         WHERE i.task_id = $1 \
         ORDER BY s.analyzed_at DESC, i.id DESC \
         LIMIT $2 OFFSET $3",
    )
    .bind(task_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
