//! Collection, ingestion, classification, and aggregation for monitoring
//! tasks, plus the per-task trigger scheduler that drives them.

pub mod aggregate;
pub mod analysis;
pub mod collector;
mod error;
pub mod ingest;
pub mod keywords;
mod locks;
pub mod memory;
pub mod nlp;
mod pipeline;
pub mod scheduler;
pub mod store;
pub mod testing;
pub mod tracker;

pub use aggregate::{
    DateRange, PeriodComparison, SentimentDistribution, DEFAULT_TREND_DAYS, MAX_RANGE_DAYS,
};
pub use analysis::AnalysisOutcome;
pub use collector::{Collector, CollectorError, HttpCollector};
pub use error::PipelineError;
pub use ingest::IngestOutcome;
pub use keywords::{KeywordQuery, KeywordViews, DEFAULT_TOP_K};
pub use memory::MemoryStore;
pub use nlp::{Classifier, KeywordExtractor, NlpClient, NlpError};
pub use pipeline::{Pipeline, PipelineSettings};
pub use scheduler::{Cadence, TaskScheduler};
pub use store::{ContentStore, PgStore};
pub use tracker::{progress_percent, PlatformProgress};
