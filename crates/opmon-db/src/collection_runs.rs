//! Database operations for `collection_runs`.

use chrono::{DateTime, Utc};
use opmon_core::{CollectionRun, Platform, RunCounters};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `collection_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub task_id: i64,
    pub platform: String,
    pub status: String,
    pub total_collected: i32,
    pub new_items: i32,
    pub duplicates: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CollectionRunRow> for CollectionRun {
    type Error = DbError;

    fn try_from(row: CollectionRunRow) -> Result<Self, Self::Error> {
        Ok(CollectionRun {
            id: row.id,
            public_id: row.public_id,
            task_id: row.task_id,
            platform: row.platform.parse()?,
            status: row.status.parse()?,
            counters: RunCounters {
                total_collected: row.total_collected,
                new_items: row.new_items,
                duplicates: row.duplicates,
            },
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}

const RUN_COLUMNS: &str = "id, public_id, task_id, platform, status, total_collected, \
                           new_items, duplicates, error_message, started_at, completed_at, \
                           created_at";

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Creates a `pending` run for `(task_id, platform)` unless a live
/// (`pending` or `running`) run already exists for that pair.
///
/// Returns `None` when a live run blocked creation. The partial unique index
/// `uq_collection_runs_live` makes the check-and-insert atomic.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_collection_run_if_idle(
    pool: &PgPool,
    task_id: i64,
    platform: Platform,
) -> Result<Option<CollectionRunRow>, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, CollectionRunRow>(&format!(
        "INSERT INTO collection_runs (public_id, task_id, platform, status) \
         VALUES ($1, $2, $3, 'pending') \
         ON CONFLICT (task_id, platform) WHERE status IN ('pending', 'running') DO NOTHING \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(public_id)
    .bind(task_id)
    .bind(platform.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] if the run is not
/// `pending`, or [`DbError::Sqlx`] if the update fails.
pub async fn start_collection_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE collection_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidCollectionRunTransition {
            id,
            expected_status: "pending",
        });
    }

    Ok(())
}

/// Marks a run as `completed` with its final counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_collection_run(
    pool: &PgPool,
    id: i64,
    counters: RunCounters,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE collection_runs \
         SET status = 'completed', completed_at = NOW(), \
             total_collected = $1, new_items = $2, duplicates = $3 \
         WHERE id = $4 AND status = 'running'",
    )
    .bind(counters.total_collected)
    .bind(counters.new_items)
    .bind(counters.duplicates)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidCollectionRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed`, keeping whatever counters were reached.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_collection_run(
    pool: &PgPool,
    id: i64,
    error_message: &str,
    counters: RunCounters,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE collection_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1, \
             total_collected = $2, new_items = $3, duplicates = $4 \
         WHERE id = $5 AND status = 'running'",
    )
    .bind(error_message)
    .bind(counters.total_collected)
    .bind(counters.new_items)
    .bind(counters.duplicates)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidCollectionRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_collection_run(pool: &PgPool, id: i64) -> Result<CollectionRunRow, DbError> {
    sqlx::query_as::<_, CollectionRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM collection_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the latest run for each platform of a task.
///
/// "Latest" is the greatest `created_at`, ties broken by `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_collection_runs(
    pool: &PgPool,
    task_id: i64,
) -> Result<Vec<CollectionRunRow>, DbError> {
    let rows = sqlx::query_as::<_, CollectionRunRow>(&format!(
        "SELECT DISTINCT ON (platform) {RUN_COLUMNS} \
         FROM collection_runs \
         WHERE task_id = $1 \
         ORDER BY platform, created_at DESC, id DESC"
    ))
    .bind(task_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a task's most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_collection_runs(
    pool: &PgPool,
    task_id: i64,
    limit: i64,
) -> Result<Vec<CollectionRunRow>, DbError> {
    let rows = sqlx::query_as::<_, CollectionRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM collection_runs \
         WHERE task_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(task_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
