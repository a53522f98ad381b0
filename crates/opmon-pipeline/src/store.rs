//! Persistence boundary for the pipeline.
//!
//! [`ContentStore`] lists every read and write the pipeline performs.
//! [`PgStore`] backs it with Postgres through `opmon-db`; the in-memory
//! implementation lives in [`crate::memory`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use opmon_core::{
    ClassifiedItem, CollectionRun, DailyCounts, DailyStat, Item, NewTask, Platform, RawItem, RunCounters,
    Sentiment, Task, TaskStatus,
};
use opmon_db::DbError;
use sqlx::PgPool;

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn create_task(&self, task: &NewTask) -> Result<Task, DbError>;
    async fn get_task(&self, id: i64) -> Result<Task, DbError>;
    async fn list_tasks_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, DbError>;
    async fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, DbError>;
    async fn set_task_status(&self, id: i64, status: TaskStatus) -> Result<Task, DbError>;

    /// Creates a `pending` run unless a live run exists for the pair.
    async fn create_run_if_idle(
        &self,
        task_id: i64,
        platform: Platform,
    ) -> Result<Option<CollectionRun>, DbError>;
    async fn start_run(&self, id: i64) -> Result<(), DbError>;
    async fn complete_run(&self, id: i64, counters: RunCounters) -> Result<(), DbError>;
    async fn fail_run(&self, id: i64, message: &str, counters: RunCounters)
        -> Result<(), DbError>;
    async fn get_run(&self, id: i64) -> Result<CollectionRun, DbError>;
    async fn latest_runs(&self, task_id: i64) -> Result<Vec<CollectionRun>, DbError>;
    async fn list_runs(&self, task_id: i64, limit: i64) -> Result<Vec<CollectionRun>, DbError>;

    /// Returns the new item id, or `None` if the native id is already stored.
    async fn insert_item_if_absent(
        &self,
        task_id: i64,
        platform: Platform,
        item: &RawItem,
        ingested_at: DateTime<Utc>,
    ) -> Result<Option<i64>, DbError>;
    async fn list_items(&self, task_id: i64, limit: i64, offset: i64)
        -> Result<Vec<Item>, DbError>;
    /// Unclassified items, fewest failed attempts first.
    async fn items_without_sentiment(&self, task_id: i64, limit: i64)
        -> Result<Vec<Item>, DbError>;
    async fn record_analysis_failure(
        &self,
        item_id: i64,
        attempted_at: DateTime<Utc>,
    ) -> Result<(), DbError>;
    async fn item_bodies(&self, task_id: i64) -> Result<Vec<String>, DbError>;
    async fn count_processed_items(&self, task_id: i64) -> Result<i64, DbError>;

    /// Returns `true` when a result was written; existing results are kept.
    async fn insert_sentiment_if_absent(
        &self,
        item_id: i64,
        sentiment: &Sentiment,
    ) -> Result<bool, DbError>;
    /// Classified items of a task, most recently analyzed first.
    async fn list_classified_items(
        &self,
        task_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ClassifiedItem>, DbError>;

    async fn scan_daily_counts(&self, task_id: i64, date: NaiveDate)
        -> Result<DailyCounts, DbError>;
    /// Upserts the aggregate, or removes it when `counts` is empty.
    async fn write_daily_stat(
        &self,
        task_id: i64,
        date: NaiveDate,
        counts: &DailyCounts,
    ) -> Result<(), DbError>;
    async fn daily_stats(
        &self,
        task_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStat>, DbError>;

    async fn ping(&self) -> Result<(), DbError>;
}

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, DbError>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl ContentStore for PgStore {
    async fn create_task(&self, task: &NewTask) -> Result<Task, DbError> {
        opmon_db::create_task(&self.pool, task).await?.try_into()
    }

    async fn get_task(&self, id: i64) -> Result<Task, DbError> {
        opmon_db::get_task(&self.pool, id).await?.try_into()
    }

    async fn list_tasks_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, DbError> {
        convert_all(opmon_db::list_tasks_for_user(&self.pool, user_id, limit, offset).await?)
    }

    async fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, DbError> {
        convert_all(opmon_db::list_tasks_by_status(&self.pool, status).await?)
    }

    async fn set_task_status(&self, id: i64, status: TaskStatus) -> Result<Task, DbError> {
        opmon_db::update_task_status(&self.pool, id, status)
            .await?
            .try_into()
    }

    async fn create_run_if_idle(
        &self,
        task_id: i64,
        platform: Platform,
    ) -> Result<Option<CollectionRun>, DbError> {
        opmon_db::create_collection_run_if_idle(&self.pool, task_id, platform)
            .await?
            .map(CollectionRun::try_from)
            .transpose()
    }

    async fn start_run(&self, id: i64) -> Result<(), DbError> {
        opmon_db::start_collection_run(&self.pool, id).await
    }

    async fn complete_run(&self, id: i64, counters: RunCounters) -> Result<(), DbError> {
        opmon_db::complete_collection_run(&self.pool, id, counters).await
    }

    async fn fail_run(
        &self,
        id: i64,
        message: &str,
        counters: RunCounters,
    ) -> Result<(), DbError> {
        opmon_db::fail_collection_run(&self.pool, id, message, counters).await
    }

    async fn get_run(&self, id: i64) -> Result<CollectionRun, DbError> {
        opmon_db::get_collection_run(&self.pool, id)
            .await?
            .try_into()
    }

    async fn latest_runs(&self, task_id: i64) -> Result<Vec<CollectionRun>, DbError> {
        convert_all(opmon_db::latest_collection_runs(&self.pool, task_id).await?)
    }

    async fn list_runs(&self, task_id: i64, limit: i64) -> Result<Vec<CollectionRun>, DbError> {
        convert_all(opmon_db::list_collection_runs(&self.pool, task_id, limit).await?)
    }

    async fn insert_item_if_absent(
        &self,
        task_id: i64,
        platform: Platform,
        item: &RawItem,
        ingested_at: DateTime<Utc>,
    ) -> Result<Option<i64>, DbError> {
        opmon_db::insert_item_if_absent(&self.pool, task_id, platform, item, ingested_at).await
    }

    async fn list_items(
        &self,
        task_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Item>, DbError> {
        convert_all(opmon_db::list_items(&self.pool, task_id, limit, offset).await?)
    }

    async fn items_without_sentiment(
        &self,
        task_id: i64,
        limit: i64,
    ) -> Result<Vec<Item>, DbError> {
        convert_all(opmon_db::list_items_without_sentiment(&self.pool, task_id, limit).await?)
    }

    async fn record_analysis_failure(
        &self,
        item_id: i64,
        attempted_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        opmon_db::record_analysis_failure(&self.pool, item_id, attempted_at).await
    }

    async fn item_bodies(&self, task_id: i64) -> Result<Vec<String>, DbError> {
        opmon_db::list_item_bodies(&self.pool, task_id).await
    }

    async fn count_processed_items(&self, task_id: i64) -> Result<i64, DbError> {
        opmon_db::count_items_with_sentiment(&self.pool, task_id).await
    }

    async fn insert_sentiment_if_absent(
        &self,
        item_id: i64,
        sentiment: &Sentiment,
    ) -> Result<bool, DbError> {
        opmon_db::insert_sentiment_result(&self.pool, item_id, sentiment).await
    }

    async fn list_classified_items(
        &self,
        task_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ClassifiedItem>, DbError> {
        convert_all(opmon_db::list_classified_items(&self.pool, task_id, limit, offset).await?)
    }

    async fn scan_daily_counts(
        &self,
        task_id: i64,
        date: NaiveDate,
    ) -> Result<DailyCounts, DbError> {
        opmon_db::scan_daily_counts(&self.pool, task_id, date).await
    }

    async fn write_daily_stat(
        &self,
        task_id: i64,
        date: NaiveDate,
        counts: &DailyCounts,
    ) -> Result<(), DbError> {
        if counts.is_empty() {
            opmon_db::delete_daily_stat(&self.pool, task_id, date).await
        } else {
            opmon_db::upsert_daily_stat(&self.pool, task_id, date, counts).await
        }
    }

    async fn daily_stats(
        &self,
        task_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStat>, DbError> {
        let rows = opmon_db::list_daily_stats(&self.pool, task_id, start, end).await?;
        Ok(rows.into_iter().map(DailyStat::from).collect())
    }

    async fn ping(&self) -> Result<(), DbError> {
        opmon_db::health_check(&self.pool).await
    }
}
