//! Shared domain types and configuration for the opinion monitor.

mod app_config;
mod config;
pub mod content;
pub mod keywords;
pub mod task;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use content::{
    ClassifiedItem, CollectionRun, DailyCounts, DailyStat, Item, RawItem, RunCounters, RunStatus,
    Sentiment, SentimentLabel,
};
pub use keywords::{frequency_view, importance_view, ImportanceEntry, KeywordScore, WeightedKeyword};
pub use task::{NewTask, Platform, PlatformSet, Task, TaskStatus, MAX_KEYWORD_LEN};

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("invalid platform: {0}")]
    InvalidPlatform(String),
    #[error("a task needs at least one platform")]
    EmptyPlatforms,
    #[error("invalid keyword: {0}")]
    InvalidKeyword(String),
    #[error("invalid task status: {0}")]
    InvalidTaskStatus(String),
    #[error("invalid run status: {0}")]
    InvalidRunStatus(String),
    #[error("invalid sentiment label: {0}")]
    InvalidSentimentLabel(String),
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
