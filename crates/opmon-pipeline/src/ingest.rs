//! Deduplicating ingestion of collector output.

use std::collections::HashSet;

use chrono::Utc;
use opmon_core::{Platform, RawItem, RunCounters};
use serde::Serialize;

use crate::error::PipelineError;
use crate::pipeline::Pipeline;

/// Per-batch ingestion counts.
///
/// `rejected` items (blank native id or body) are not part of
/// `total_collected`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub new_items: i32,
    pub duplicates: i32,
    pub rejected: i32,
}

impl IngestOutcome {
    #[must_use]
    pub fn total_collected(&self) -> i32 {
        self.new_items + self.duplicates
    }

    #[must_use]
    pub fn counters(&self) -> RunCounters {
        RunCounters {
            total_collected: self.total_collected(),
            new_items: self.new_items,
            duplicates: self.duplicates,
        }
    }
}

impl Pipeline {
    /// Stores each admissible item whose native id is not yet known anywhere.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if an insert fails; items before the
    /// failure stay stored.
    pub async fn ingest(
        &self,
        task_id: i64,
        platform: Platform,
        items: &[RawItem],
    ) -> Result<IngestOutcome, PipelineError> {
        let mut outcome = IngestOutcome::default();
        self.ingest_into(task_id, platform, items, &mut outcome)
            .await?;
        Ok(outcome)
    }

    /// Like [`Pipeline::ingest`], accumulating into `outcome` so a caller
    /// still sees partial counts after an error.
    pub(crate) async fn ingest_into(
        &self,
        task_id: i64,
        platform: Platform,
        items: &[RawItem],
        outcome: &mut IngestOutcome,
    ) -> Result<(), PipelineError> {
        let ingested_at = Utc::now();
        let mut seen: HashSet<&str> = HashSet::with_capacity(items.len());

        for item in items {
            if !item.is_admissible() {
                outcome.rejected += 1;
                tracing::warn!(
                    task_id,
                    platform = %platform,
                    native_id = %item.native_id,
                    "pipeline: rejecting item without native id or body"
                );
                continue;
            }

            if !seen.insert(item.native_id.trim()) {
                outcome.duplicates += 1;
                continue;
            }

            match self
                .store
                .insert_item_if_absent(task_id, platform, item, ingested_at)
                .await?
            {
                Some(_) => outcome.new_items += 1,
                None => outcome.duplicates += 1,
            }
        }

        tracing::debug!(
            task_id,
            platform = %platform,
            new_items = outcome.new_items,
            duplicates = outcome.duplicates,
            rejected = outcome.rejected,
            "pipeline: batch ingested"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::store::ContentStore;
    use crate::testing::{raw_item, test_pipeline};

    fn at(day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn second_ingest_of_same_batch_is_all_duplicates() {
        let (pipeline, doubles) = test_pipeline();
        let batch = vec![raw_item("a", "one", at(1)), raw_item("b", "two", at(1))];

        let first = pipeline.ingest(1, Platform::Twitter, &batch).await.unwrap();
        let second = pipeline.ingest(1, Platform::Twitter, &batch).await.unwrap();

        assert_eq!((first.new_items, first.duplicates), (2, 0));
        assert_eq!((second.new_items, second.duplicates), (0, 2));
        assert_eq!(second.total_collected(), 2);

        assert_eq!(doubles.store.list_items(1, 10, 0).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ingests_of_one_item_store_it_once() {
        let (pipeline, doubles) = test_pipeline();
        let batch = vec![raw_item("contested", "text", at(2))];

        let workers: Vec<_> = (0..8_i64)
            .map(|n| {
                let pipeline = Arc::clone(&pipeline);
                let batch = batch.clone();
                tokio::spawn(async move {
                    pipeline
                        .ingest(1 + n % 2, Platform::Twitter, &batch)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut new_items = 0;
        let mut duplicates = 0;
        for worker in workers {
            let outcome = worker.await.unwrap();
            new_items += outcome.new_items;
            duplicates += outcome.duplicates;
        }

        assert_eq!((new_items, duplicates), (1, 7));
        let stored = doubles.store.list_items(1, 10, 0).await.unwrap().len()
            + doubles.store.list_items(2, 10, 0).await.unwrap().len();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn dedup_is_global_across_tasks_and_platforms() {
        let (pipeline, _) = test_pipeline();
        let batch = vec![raw_item("shared", "text", at(1))];

        pipeline.ingest(1, Platform::Twitter, &batch).await.unwrap();
        let other = pipeline.ingest(2, Platform::Reddit, &batch).await.unwrap();

        assert_eq!(other.new_items, 0);
        assert_eq!(other.duplicates, 1);
    }

    #[tokio::test]
    async fn repeated_native_id_within_batch_counts_once() {
        let (pipeline, _) = test_pipeline();
        let batch = vec![
            raw_item("x", "first copy", at(1)),
            raw_item("x", "second copy", at(1)),
            raw_item(" x ", "padded copy", at(1)),
        ];

        let outcome = pipeline.ingest(1, Platform::Weibo, &batch).await.unwrap();
        assert_eq!(outcome.new_items, 1);
        assert_eq!(outcome.duplicates, 2);
    }

    #[tokio::test]
    async fn inadmissible_items_are_rejected_not_counted() {
        let (pipeline, _) = test_pipeline();
        let batch = vec![
            raw_item("", "no id", at(1)),
            raw_item("ok", "   ", at(1)),
            raw_item("good-id", "body", at(1)),
        ];

        let outcome = pipeline.ingest(1, Platform::Zhihu, &batch).await.unwrap();
        assert_eq!(outcome.rejected, 2);
        assert_eq!(outcome.total_collected(), 1);
        let counters = outcome.counters();
        assert_eq!(
            counters.new_items + counters.duplicates,
            counters.total_collected
        );
    }
}
