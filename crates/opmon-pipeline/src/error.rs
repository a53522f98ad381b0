use chrono::NaiveDate;
use opmon_core::CoreError;
use opmon_db::DbError;
use thiserror::Error;

/// Errors produced by the monitoring pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not found")]
    NotFound,

    #[error("task {task_id} belongs to another user")]
    Forbidden { task_id: i64 },

    /// Collector, classifier, or keyword extractor failure.
    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("range of {days} days exceeds the maximum of {max}")]
    RangeTooLong { days: i64, max: i64 },

    #[error("collection run {id} is not in expected status '{expected_status}'")]
    InvalidRunTransition {
        id: i64,
        expected_status: &'static str,
    },

    #[error("invalid input: {0}")]
    Invalid(#[from] CoreError),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    Store(DbError),
}

impl From<DbError> for PipelineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => PipelineError::NotFound,
            DbError::InvalidCollectionRunTransition {
                id,
                expected_status,
            } => PipelineError::InvalidRunTransition {
                id,
                expected_status,
            },
            other => PipelineError::Store(other),
        }
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for PipelineError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        PipelineError::Scheduler(err.to_string())
    }
}
