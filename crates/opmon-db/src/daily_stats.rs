//! Database operations for `daily_stats` and the scan that feeds it.

use chrono::{DateTime, NaiveDate, Utc};
use opmon_core::{DailyCounts, DailyStat};
use rust_decimal::prelude::*;
use sqlx::PgPool;

use crate::sentiment::unit_decimal;
use crate::DbError;

/// A row from the `daily_stats` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyStatRow {
    pub id: i64,
    pub task_id: i64,
    pub stat_date: NaiveDate,
    pub total_count: i32,
    pub positive_count: i32,
    pub neutral_count: i32,
    pub negative_count: i32,
    pub average_score: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl From<DailyStatRow> for DailyStat {
    fn from(row: DailyStatRow) -> Self {
        DailyStat {
            task_id: row.task_id,
            date: row.stat_date,
            counts: DailyCounts {
                total: row.total_count,
                positive: row.positive_count,
                neutral: row.neutral_count,
                negative: row.negative_count,
                average_score: row.average_score.and_then(|d| d.to_f64()),
            },
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CountsRow {
    total: i32,
    positive: i32,
    neutral: i32,
    negative: i32,
    average_score: Option<Decimal>,
}

/// Counts a task's classified items published on `date` (UTC), by label.
///
/// Items without a sentiment result are not counted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn scan_daily_counts(
    pool: &PgPool,
    task_id: i64,
    date: NaiveDate,
) -> Result<DailyCounts, DbError> {
    let row = sqlx::query_as::<_, CountsRow>(
        "SELECT COUNT(*)::INT4 AS total, \
                (COUNT(*) FILTER (WHERE s.label = 'positive'))::INT4 AS positive, \
                (COUNT(*) FILTER (WHERE s.label = 'neutral'))::INT4 AS neutral, \
                (COUNT(*) FILTER (WHERE s.label = 'negative'))::INT4 AS negative, \
                ROUND(AVG(s.score), 4) AS average_score \
         FROM items i \
         JOIN sentiment_results s ON s.item_id = i.id \
         WHERE i.task_id = $1 AND (i.published_at AT TIME ZONE 'UTC')::DATE = $2",
    )
    .bind(task_id)
    .bind(date)
    .fetch_one(pool)
    .await?;

    Ok(DailyCounts {
        total: row.total,
        positive: row.positive,
        neutral: row.neutral,
        negative: row.negative,
        average_score: row.average_score.and_then(|d| d.to_f64()),
    })
}

/// Writes the aggregate for `(task_id, date)`, replacing any previous row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_daily_stat(
    pool: &PgPool,
    task_id: i64,
    date: NaiveDate,
    counts: &DailyCounts,
) -> Result<(), DbError> {
    let average_score = counts
        .average_score
        .map(|v| unit_decimal("average_score", v))
        .transpose()?;

    sqlx::query(
        "INSERT INTO daily_stats \
             (task_id, stat_date, total_count, positive_count, neutral_count, \
              negative_count, average_score) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (task_id, stat_date) DO UPDATE SET \
             total_count    = EXCLUDED.total_count, \
             positive_count = EXCLUDED.positive_count, \
             neutral_count  = EXCLUDED.neutral_count, \
             negative_count = EXCLUDED.negative_count, \
             average_score  = EXCLUDED.average_score, \
             updated_at     = NOW()",
    )
    .bind(task_id)
    .bind(date)
    .bind(counts.total)
    .bind(counts.positive)
    .bind(counts.neutral)
    .bind(counts.negative)
    .bind(average_score)
    .execute(pool)
    .await?;

    Ok(())
}

/// Removes the aggregate for `(task_id, date)` if present.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_daily_stat(pool: &PgPool, task_id: i64, date: NaiveDate) -> Result<(), DbError> {
    sqlx::query("DELETE FROM daily_stats WHERE task_id = $1 AND stat_date = $2")
        .bind(task_id)
        .bind(date)
        .execute(pool)
        .await?;
    Ok(())
}

/// Lists a task's aggregates within the closed range `[start, end]`, by date.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_daily_stats(
    pool: &PgPool,
    task_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<DailyStatRow>, DbError> {
    let rows = sqlx::query_as::<_, DailyStatRow>(
        "SELECT id, task_id, stat_date, total_count, positive_count, neutral_count, \
                negative_count, average_score, updated_at \
         FROM daily_stats \
         WHERE task_id = $1 AND stat_date BETWEEN $2 AND $3 \
         ORDER BY stat_date",
    )
    .bind(task_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
