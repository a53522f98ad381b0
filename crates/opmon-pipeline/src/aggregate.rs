//! Daily sentiment aggregates and the views derived from them.

use chrono::{Days, NaiveDate};
use opmon_core::{DailyCounts, DailyStat};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::pipeline::Pipeline;

pub const DEFAULT_TREND_DAYS: u32 = 7;

/// Longest range a single recompute pass or trend window may cover.
pub const MAX_RANGE_DAYS: i64 = 366;

/// A closed range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRange`] when `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PipelineError> {
        if start > end {
            return Err(PipelineError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The `days` dates ending at `end`, inclusive. `days` below 1 is treated as 1.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::RangeTooLong`] when `days` exceeds
    /// [`MAX_RANGE_DAYS`].
    pub fn last_days(end: NaiveDate, days: u32) -> Result<Self, PipelineError> {
        if i64::from(days) > MAX_RANGE_DAYS {
            return Err(PipelineError::RangeTooLong {
                days: i64::from(days),
                max: MAX_RANGE_DAYS,
            });
        }
        let back = u64::from(days.max(1) - 1);
        let start = end.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN);
        Ok(Self { start, end })
    }

    /// Number of dates in the range, both ends included.
    #[must_use]
    pub fn len_days(self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn dates(self) -> impl Iterator<Item = NaiveDate> {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}

/// Label totals across a range, with percentage rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SentimentDistribution {
    pub total: i64,
    pub positive: i64,
    pub neutral: i64,
    pub negative: i64,
    pub positive_rate: f64,
    pub neutral_rate: f64,
    pub negative_rate: f64,
}

impl SentimentDistribution {
    /// Sums the daily rows. Rates are `0` when there is nothing to count.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_stats(stats: &[DailyStat]) -> Self {
        let mut dist = Self::default();
        for stat in stats {
            dist.total += i64::from(stat.counts.total);
            dist.positive += i64::from(stat.counts.positive);
            dist.neutral += i64::from(stat.counts.neutral);
            dist.negative += i64::from(stat.counts.negative);
        }
        if dist.total > 0 {
            let total = dist.total as f64;
            dist.positive_rate = dist.positive as f64 / total * 100.0;
            dist.neutral_rate = dist.neutral as f64 / total * 100.0;
            dist.negative_rate = dist.negative as f64 / total * 100.0;
        }
        dist
    }
}

/// Two periods side by side; changes are `period2 - period1` in rate points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub period1: SentimentDistribution,
    pub period2: SentimentDistribution,
    pub positive_change: f64,
    pub neutral_change: f64,
    pub negative_change: f64,
}

impl Pipeline {
    /// Rebuilds the aggregate for one (task, date) from the stored items and
    /// their results. A day without classified items loses its row.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if the scan or the write fails.
    pub async fn recompute(
        &self,
        task_id: i64,
        date: NaiveDate,
    ) -> Result<DailyCounts, PipelineError> {
        let _lease = self.day_locks.acquire((task_id, date)).await;
        self.recompute_locked(task_id, date).await
    }

    async fn recompute_locked(
        &self,
        task_id: i64,
        date: NaiveDate,
    ) -> Result<DailyCounts, PipelineError> {
        let counts = self.store.scan_daily_counts(task_id, date).await?;
        self.store.write_daily_stat(task_id, date, &counts).await?;
        tracing::debug!(
            task_id,
            date = %date,
            total = counts.total,
            "pipeline: daily stat recomputed"
        );
        Ok(counts)
    }

    /// Recomputes every date in `start..=end`; returns the number of dates.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRange`] when `start > end`,
    /// [`PipelineError::RangeTooLong`] when the range spans more than
    /// [`MAX_RANGE_DAYS`], or the first recompute failure.
    pub async fn recompute_range(
        &self,
        task_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<usize, PipelineError> {
        let range = DateRange::new(start, end)?;
        if range.len_days() > MAX_RANGE_DAYS {
            return Err(PipelineError::RangeTooLong {
                days: range.len_days(),
                max: MAX_RANGE_DAYS,
            });
        }
        let mut days = 0;
        for date in range.dates() {
            self.recompute(task_id, date).await?;
            days += 1;
        }
        Ok(days)
    }

    /// Stored aggregates in `start..=end`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRange`] when `start > end`.
    pub async fn stats_for_range(
        &self,
        task_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStat>, PipelineError> {
        let range = DateRange::new(start, end)?;
        Ok(self
            .store
            .daily_stats(task_id, range.start, range.end)
            .await?)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRange`] when `start > end`.
    pub async fn distribution(
        &self,
        task_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SentimentDistribution, PipelineError> {
        let stats = self.stats_for_range(task_id, start, end).await?;
        Ok(SentimentDistribution::from_stats(&stats))
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRange`] if either period is inverted.
    pub async fn compare(
        &self,
        task_id: i64,
        period1: DateRange,
        period2: DateRange,
    ) -> Result<PeriodComparison, PipelineError> {
        let first = self
            .distribution(task_id, period1.start, period1.end)
            .await?;
        let second = self
            .distribution(task_id, period2.start, period2.end)
            .await?;
        Ok(PeriodComparison {
            period1: first,
            period2: second,
            positive_change: second.positive_rate - first.positive_rate,
            neutral_change: second.neutral_rate - first.neutral_rate,
            negative_change: second.negative_rate - first.negative_rate,
        })
    }

    /// Aggregates for the `days` dates ending at `today`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::RangeTooLong`] when `days` exceeds
    /// [`MAX_RANGE_DAYS`], or [`PipelineError::Store`] on store failure.
    pub async fn trend(
        &self,
        task_id: i64,
        days: u32,
        today: NaiveDate,
    ) -> Result<Vec<DailyStat>, PipelineError> {
        let range = DateRange::last_days(today, days)?;
        self.stats_for_range(task_id, range.start, range.end).await
    }
}
