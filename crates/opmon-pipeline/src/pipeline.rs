//! The [`Pipeline`] handle shared by the scheduler, HTTP API, and CLI.

use std::sync::Arc;

use chrono::NaiveDate;
use opmon_core::{AppConfig, ClassifiedItem, Item, NewTask, PlatformSet, Task, TaskStatus};

use crate::collector::Collector;
use crate::error::PipelineError;
use crate::locks::KeyedLocks;
use crate::nlp::{Classifier, KeywordExtractor};
use crate::store::ContentStore;

/// Tunables for collection and analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Items requested from the collector per run.
    pub collect_count: u32,
    /// Maximum unclassified items picked up by one analysis pass.
    pub analyze_batch: i64,
    pub analyze_concurrency: usize,
    /// Cron expression used when a task is armed without an explicit cadence.
    pub default_interval: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            collect_count: 20,
            analyze_batch: 200,
            analyze_concurrency: 4,
            default_interval: "0 */30 * * * *".to_string(),
        }
    }
}

impl PipelineSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            collect_count: config.collect_count,
            analyze_batch: config.analyze_batch,
            analyze_concurrency: config.analyze_concurrency.max(1),
            default_interval: config.default_interval.clone(),
        }
    }
}

/// Store, external services, and settings bundled for the pipeline stages.
pub struct Pipeline {
    pub(crate) store: Arc<dyn ContentStore>,
    pub(crate) collector: Arc<dyn Collector>,
    pub(crate) classifier: Arc<dyn Classifier>,
    pub(crate) extractor: Arc<dyn KeywordExtractor>,
    pub(crate) day_locks: KeyedLocks<(i64, NaiveDate)>,
    /// One analysis pass per task at a time.
    pub(crate) analysis_locks: KeyedLocks<i64>,
    pub(crate) settings: PipelineSettings,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        store: Arc<dyn ContentStore>,
        collector: Arc<dyn Collector>,
        classifier: Arc<dyn Classifier>,
        extractor: Arc<dyn KeywordExtractor>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            collector,
            classifier,
            extractor,
            day_locks: KeyedLocks::default(),
            analysis_locks: KeyedLocks::default(),
            settings,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Validates input and creates a task in `active` status.
    ///
    /// The task is not armed; call the scheduler's `start` for that.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Invalid`] for a blank or overlong keyword or
    /// a bad platform list, or [`PipelineError::Store`] on store failure.
    pub async fn create_task<S: AsRef<str>>(
        &self,
        user_id: i64,
        keyword: &str,
        description: Option<&str>,
        platforms: &[S],
    ) -> Result<Task, PipelineError> {
        let platforms = PlatformSet::parse(platforms)?;
        let new_task = NewTask::new(user_id, keyword, description, platforms)?;
        let task = self.store.create_task(&new_task).await?;
        tracing::info!(
            task_id = task.id,
            user_id,
            keyword = %task.keyword,
            "pipeline: task created"
        );
        Ok(task)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the task does not exist.
    pub async fn get_task(&self, task_id: i64) -> Result<Task, PipelineError> {
        Ok(self.store.get_task(task_id).await?)
    }

    /// Fetches a task and checks that `user_id` owns it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the task does not exist, or
    /// [`PipelineError::Forbidden`] if another user owns it.
    pub async fn get_owned_task(&self, task_id: i64, user_id: i64) -> Result<Task, PipelineError> {
        let task = self.get_task(task_id).await?;
        if task.user_id != user_id {
            return Err(PipelineError::Forbidden { task_id });
        }
        Ok(task)
    }

    /// Lists a user's tasks, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on store failure.
    pub async fn list_tasks(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, PipelineError> {
        Ok(self
            .store
            .list_tasks_for_user(user_id, limit, offset)
            .await?)
    }

    /// A task's items, newest published first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on store failure.
    pub async fn list_items(
        &self,
        task_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Item>, PipelineError> {
        Ok(self.store.list_items(task_id, limit, offset).await?)
    }

    /// A task's classified items with their sentiment, most recently
    /// analyzed first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on store failure.
    pub async fn list_classified_items(
        &self,
        task_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ClassifiedItem>, PipelineError> {
        Ok(self
            .store
            .list_classified_items(task_id, limit, offset)
            .await?)
    }

    /// Persists a status change without touching any trigger.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the task does not exist.
    pub async fn set_task_status(
        &self,
        task_id: i64,
        status: TaskStatus,
    ) -> Result<Task, PipelineError> {
        Ok(self.store.set_task_status(task_id, status).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_pipeline;

    #[tokio::test]
    async fn create_task_normalises_input() {
        let (pipeline, _) = test_pipeline();
        let task = pipeline
            .create_task(1, "  opinion  ", Some(""), &["weibo", "twitter", "weibo"])
            .await
            .unwrap();

        assert_eq!(task.keyword, "opinion");
        assert!(task.description.is_none());
        assert_eq!(task.platforms.to_strings(), vec!["weibo", "twitter"]);
        assert_eq!(task.status, TaskStatus::Active);
    }

    #[tokio::test]
    async fn create_task_rejects_unknown_platform() {
        let (pipeline, _) = test_pipeline();
        let err = pipeline
            .create_task(1, "kw", None, &["myspace"])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Invalid(_)));
    }

    #[tokio::test]
    async fn create_task_rejects_empty_platforms() {
        let (pipeline, _) = test_pipeline();
        let none: [&str; 0] = [];
        let err = pipeline.create_task(1, "kw", None, &none).await.unwrap_err();
        assert!(matches!(err, PipelineError::Invalid(_)));
    }

    #[tokio::test]
    async fn owned_task_check_rejects_other_user() {
        let (pipeline, _) = test_pipeline();
        let task = pipeline
            .create_task(1, "kw", None, &["reddit"])
            .await
            .unwrap();

        assert!(pipeline.get_owned_task(task.id, 1).await.is_ok());
        let err = pipeline.get_owned_task(task.id, 2).await.unwrap_err();
        assert!(matches!(err, PipelineError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn missing_task_is_not_found() {
        let (pipeline, _) = test_pipeline();
        assert!(matches!(
            pipeline.get_task(77).await,
            Err(PipelineError::NotFound)
        ));
    }

    #[tokio::test]
    async fn list_tasks_is_newest_first() {
        let (pipeline, _) = test_pipeline();
        let a = pipeline.create_task(1, "a", None, &["reddit"]).await.unwrap();
        let b = pipeline.create_task(1, "b", None, &["reddit"]).await.unwrap();
        pipeline.create_task(2, "c", None, &["reddit"]).await.unwrap();

        let ids: Vec<i64> = pipeline
            .list_tasks(1, 50, 0)
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }
}
