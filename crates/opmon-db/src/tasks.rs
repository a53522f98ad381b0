//! Database operations for `monitoring_tasks`.

use chrono::{DateTime, Utc};
use opmon_core::{NewTask, PlatformSet, Task, TaskStatus};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `monitoring_tasks` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub user_id: i64,
    pub keyword: String,
    pub description: Option<String>,
    /// Stored as `TEXT[]`, in the order the user chose.
    pub platforms: Vec<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = DbError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: row.id,
            user_id: row.user_id,
            keyword: row.keyword,
            description: row.description,
            platforms: PlatformSet::parse(row.platforms.as_slice())?,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const TASK_COLUMNS: &str =
    "id, user_id, keyword, description, platforms, status, created_at, updated_at";

/// Inserts a task in `active` status and returns it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_task(pool: &PgPool, task: &NewTask) -> Result<TaskRow, DbError> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "INSERT INTO monitoring_tasks (user_id, keyword, description, platforms, status) \
         VALUES ($1, $2, $3, $4, 'active') \
         RETURNING {TASK_COLUMNS}"
    ))
    .bind(task.user_id)
    .bind(&task.keyword)
    .bind(task.description.as_deref())
    .bind(task.platforms.to_strings())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetches a task by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no such task exists, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_task(pool: &PgPool, id: i64) -> Result<TaskRow, DbError> {
    sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM monitoring_tasks WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists one user's tasks, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_tasks_for_user(
    pool: &PgPool,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<TaskRow>, DbError> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM monitoring_tasks \
         WHERE user_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2 OFFSET $3"
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lists every task with the given status, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_tasks_by_status(
    pool: &PgPool,
    status: TaskStatus,
) -> Result<Vec<TaskRow>, DbError> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM monitoring_tasks WHERE status = $1 ORDER BY id"
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Sets a task's status and bumps `updated_at`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no such task exists, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_task_status(
    pool: &PgPool,
    id: i64,
    status: TaskStatus,
) -> Result<TaskRow, DbError> {
    sqlx::query_as::<_, TaskRow>(&format!(
        "UPDATE monitoring_tasks SET status = $1, updated_at = NOW() \
         WHERE id = $2 \
         RETURNING {TASK_COLUMNS}"
    ))
    .bind(status.as_str())
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
