//! Collected content, collection-run status, and sentiment values.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, Platform};

/// One item as returned by an external collector, before deduplication.
///
/// Field names follow the collector wire format (`camelCase`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    /// Platform-native identifier; the global dedup key.
    pub native_id: String,
    #[serde(default)]
    pub author: Option<String>,
    pub body: String,
    #[serde(default)]
    pub like_count: i32,
    #[serde(default)]
    pub reply_count: i32,
    #[serde(default)]
    pub share_count: i32,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl RawItem {
    /// Whether the item carries the minimum needed to be stored.
    #[must_use]
    pub fn is_admissible(&self) -> bool {
        !self.native_id.trim().is_empty() && !self.body.trim().is_empty()
    }
}

/// Lifecycle of a collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// `pending` and `running` runs block new runs for the same (task, platform).
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, RunStatus::Pending | RunStatus::Running)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(CoreError::InvalidRunStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(SentimentLabel::Positive),
            "neutral" => Ok(SentimentLabel::Neutral),
            "negative" => Ok(SentimentLabel::Negative),
            other => Err(CoreError::InvalidSentimentLabel(other.to_string())),
        }
    }
}

/// Classifier output for one item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f64,
    pub confidence: f64,
}

impl Sentiment {
    /// Builds a sentiment value, rejecting scores outside `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OutOfUnitRange`] when `score` or `confidence`
    /// is NaN or outside the unit interval.
    pub fn new(label: SentimentLabel, score: f64, confidence: f64) -> Result<Self, CoreError> {
        check_unit("score", score)?;
        check_unit("confidence", confidence)?;
        Ok(Self {
            label,
            score,
            confidence,
        })
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), CoreError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::OutOfUnitRange { field, value })
    }
}

/// Label counts for one task and one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyCounts {
    pub total: i32,
    pub positive: i32,
    pub neutral: i32,
    pub negative: i32,
    /// Mean classifier score of the counted items; `None` when `total == 0`.
    pub average_score: Option<f64>,
}

impl DailyCounts {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Counters a run accumulates while ingesting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub total_collected: i32,
    pub new_items: i32,
    pub duplicates: i32,
}

/// One attempt to collect a task's keyword from one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRun {
    pub id: i64,
    pub public_id: Uuid,
    pub task_id: i64,
    pub platform: Platform,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A stored, deduplicated content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub task_id: i64,
    pub platform: Platform,
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

/// A stored item together with its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedItem {
    pub item: Item,
    pub sentiment: Sentiment,
    pub analyzed_at: DateTime<Utc>,
}

/// Persisted daily aggregate for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStat {
    pub task_id: i64,
    pub date: NaiveDate,
    pub counts: DailyCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_item_deserializes_collector_payload() {
        let json = r#"{
            "nativeId": "tw-1",
            "author": "alice",
            "body": "hello",
            "likeCount": 3,
            "replyCount": 1,
            "shareCount": 0,
            "url": "https://example.com/1",
            "publishedAt": "2026-03-01T10:00:00Z"
        }"#;
        let item: RawItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.native_id, "tw-1");
        assert_eq!(item.like_count, 3);
        assert!(item.published_at.is_some());
    }

    #[test]
    fn raw_item_defaults_missing_counters() {
        let item: RawItem = serde_json::from_str(r#"{"nativeId":"x","body":"b"}"#).unwrap();
        assert_eq!(item.reply_count, 0);
        assert!(item.author.is_none());
        assert!(item.published_at.is_none());
    }

    #[test]
    fn blank_native_id_is_not_admissible() {
        let item: RawItem = serde_json::from_str(r#"{"nativeId":"  ","body":"b"}"#).unwrap();
        assert!(!item.is_admissible());
    }

    #[test]
    fn live_statuses() {
        assert!(RunStatus::Pending.is_live());
        assert!(RunStatus::Running.is_live());
        assert!(!RunStatus::Completed.is_live());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn sentiment_rejects_out_of_range_score() {
        let err = Sentiment::new(SentimentLabel::Positive, 1.2, 0.9).unwrap_err();
        assert_eq!(
            err,
            CoreError::OutOfUnitRange {
                field: "score",
                value: 1.2
            }
        );
    }

    #[test]
    fn sentiment_rejects_nan_confidence() {
        assert!(Sentiment::new(SentimentLabel::Neutral, 0.5, f64::NAN).is_err());
    }

    #[test]
    fn sentiment_label_parses() {
        assert_eq!("negative".parse(), Ok(SentimentLabel::Negative));
        assert!("angry".parse::<SentimentLabel>().is_err());
    }
}
