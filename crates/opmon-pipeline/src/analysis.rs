//! Sentiment classification of stored items.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use opmon_core::{Item, Sentiment};
use serde::Serialize;

use crate::error::PipelineError;
use crate::nlp::NlpError;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisOutcome {
    pub analyzed: usize,
    pub failed: usize,
}

impl Pipeline {
    /// Classifies up to `limit` items of the task that have no result yet,
    /// stores the results, and recomputes the affected days.
    ///
    /// A classifier failure leaves that item unclassified, counts in
    /// `failed`, and moves the item behind items with fewer failed attempts
    /// for later passes. It does not abort the pass. Passes for the same
    /// task run one at a time.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if loading items, storing a result,
    /// or recomputing a day fails.
    pub async fn analyze_pending(
        &self,
        task_id: i64,
        limit: i64,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let _lease = self.analysis_locks.acquire(task_id).await;
        let items = self.store.items_without_sentiment(task_id, limit).await?;
        if items.is_empty() {
            return Ok(AnalysisOutcome::default());
        }

        let classifier = Arc::clone(&self.classifier);
        let classified: Vec<(Item, Result<Sentiment, NlpError>)> = stream::iter(items)
            .map(move |item| {
                let classifier = Arc::clone(&classifier);
                async move {
                    let result = classifier.classify(&item.body).await;
                    (item, result)
                }
            })
            .buffer_unordered(self.settings.analyze_concurrency.max(1))
            .collect()
            .await;

        let mut outcome = AnalysisOutcome::default();
        let mut touched = BTreeSet::new();
        for (item, result) in classified {
            match result {
                Ok(sentiment) => {
                    if self
                        .store
                        .insert_sentiment_if_absent(item.id, &sentiment)
                        .await?
                    {
                        outcome.analyzed += 1;
                        touched.insert(item.published_at.date_naive());
                    }
                }
                Err(e) => {
                    outcome.failed += 1;
                    self.store
                        .record_analysis_failure(item.id, Utc::now())
                        .await?;
                    tracing::warn!(
                        task_id,
                        item_id = item.id,
                        error = %e,
                        "pipeline: classification failed; item left unclassified"
                    );
                }
            }
        }

        for date in touched {
            self.recompute(task_id, date).await?;
        }

        tracing::info!(
            task_id,
            analyzed = outcome.analyzed,
            failed = outcome.failed,
            "pipeline: analysis pass finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use opmon_core::Platform;

    use super::*;
    use crate::store::ContentStore;
    use crate::testing::{raw_item, test_pipeline};

    #[tokio::test]
    async fn classifies_pending_items_and_updates_daily_stats() {
        let (pipeline, doubles) = test_pipeline();
        let day = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        pipeline
            .ingest(
                1,
                Platform::Weibo,
                &[
                    raw_item("a", "good news", day),
                    raw_item("b", "bad news", day),
                    raw_item("c", "this will fail", day),
                ],
            )
            .await
            .unwrap();

        let outcome = pipeline.analyze_pending(1, 100).await.unwrap();
        assert_eq!(outcome, AnalysisOutcome { analyzed: 2, failed: 1 });
        assert_eq!(doubles.store.count_processed_items(1).await.unwrap(), 2);

        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let stats = pipeline.stats_for_range(1, date, date).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].counts.total, 2);
        assert_eq!(stats[0].counts.positive, 1);
        assert_eq!(stats[0].counts.negative, 1);
    }

    #[tokio::test]
    async fn second_pass_only_retries_failures() {
        let (pipeline, _) = test_pipeline();
        let day = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        pipeline
            .ingest(
                1,
                Platform::Weibo,
                &[raw_item("a", "good", day), raw_item("b", "fail", day)],
            )
            .await
            .unwrap();

        pipeline.analyze_pending(1, 100).await.unwrap();
        let again = pipeline.analyze_pending(1, 100).await.unwrap();
        assert_eq!(again, AnalysisOutcome { analyzed: 0, failed: 1 });
    }

    #[tokio::test]
    async fn limit_bounds_the_pass() {
        let (pipeline, _) = test_pipeline();
        let day = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        let batch: Vec<_> = (0..5)
            .map(|i| raw_item(&format!("n{i}"), "neutral words", day))
            .collect();
        pipeline.ingest(1, Platform::Reddit, &batch).await.unwrap();

        assert_eq!(pipeline.analyze_pending(1, 3).await.unwrap().analyzed, 3);
        assert_eq!(pipeline.analyze_pending(1, 3).await.unwrap().analyzed, 2);
    }

    #[tokio::test]
    async fn repeatedly_rejected_items_do_not_starve_later_ones() {
        let (pipeline, doubles) = test_pipeline();
        let day = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        pipeline
            .ingest(
                1,
                Platform::Weibo,
                &[
                    raw_item("f1", "fail", day),
                    raw_item("f2", "fail", day),
                    raw_item("g1", "good", day),
                ],
            )
            .await
            .unwrap();

        let first = pipeline.analyze_pending(1, 2).await.unwrap();
        assert_eq!(first, AnalysisOutcome { analyzed: 0, failed: 2 });

        let second = pipeline.analyze_pending(1, 2).await.unwrap();
        assert_eq!(second, AnalysisOutcome { analyzed: 1, failed: 1 });
        assert_eq!(doubles.store.count_processed_items(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_passes_for_one_task_classify_each_item_once() {
        let (pipeline, doubles) = test_pipeline();
        let day = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
        let batch: Vec<_> = (0..6)
            .map(|i| raw_item(&format!("p{i}"), "good words", day))
            .collect();
        pipeline.ingest(1, Platform::Twitter, &batch).await.unwrap();

        let (a, b) = tokio::join!(
            pipeline.analyze_pending(1, 100),
            pipeline.analyze_pending(1, 100)
        );

        assert_eq!(a.unwrap().analyzed + b.unwrap().analyzed, 6);
        assert_eq!(doubles.classifier.calls(), 6);
        assert_eq!(pipeline.analysis_locks.len(), 0);
    }

    #[tokio::test]
    async fn nothing_pending_is_a_noop() {
        let (pipeline, _) = test_pipeline();
        assert_eq!(
            pipeline.analyze_pending(1, 10).await.unwrap(),
            AnalysisOutcome::default()
        );
    }
}
