//! Collection runs: creation with overlap skip, execution, and progress.

use std::sync::Arc;

use opmon_core::{CollectionRun, Platform, RunCounters, Task, TaskStatus};
use opmon_db::DbError;
use serde::Serialize;

use crate::error::PipelineError;
use crate::ingest::IngestOutcome;
use crate::pipeline::Pipeline;

/// Percentage of collected items that have been classified, in `0..=100`.
///
/// Returns `0` when nothing was collected.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn progress_percent(processed: i64, collected: i32) -> u8 {
    if collected <= 0 {
        return 0;
    }
    let ratio = processed.max(0) as f64 / f64::from(collected) * 100.0;
    ratio.round().clamp(0.0, 100.0) as u8
}

/// Latest run for one platform of a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformProgress {
    pub platform: Platform,
    pub run: CollectionRun,
    pub progress: u8,
}

impl Pipeline {
    /// Creates a `pending` run for every platform of `task` that has no live
    /// run. Platforms with a live run are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if run creation fails.
    pub async fn open_runs(&self, task: &Task) -> Result<Vec<CollectionRun>, PipelineError> {
        let mut created = Vec::with_capacity(task.platforms.as_slice().len());
        for platform in task.platforms.iter() {
            match self.store.create_run_if_idle(task.id, platform).await? {
                Some(run) => created.push(run),
                None => tracing::info!(
                    task_id = task.id,
                    platform = %platform,
                    "pipeline: live run exists; skipping platform"
                ),
            }
        }
        Ok(created)
    }

    /// Executes a `pending` run to completion: marks it running, calls the
    /// collector, ingests the result, and records the outcome.
    ///
    /// Collector and ingestion failures end the run as `failed`; they are not
    /// returned as errors. After a completed run, pending items of the task
    /// are classified.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRunTransition`] if the run is not
    /// `pending`, or [`PipelineError::Store`] if recording the outcome fails.
    pub async fn execute_run(
        &self,
        run: CollectionRun,
        keyword: &str,
    ) -> Result<CollectionRun, PipelineError> {
        self.store.start_run(run.id).await?;
        tracing::info!(
            run_id = run.id,
            task_id = run.task_id,
            platform = %run.platform,
            "pipeline: collection run started"
        );

        match self
            .collector
            .collect(keyword, run.platform, self.settings.collect_count)
            .await
        {
            Err(e) => {
                tracing::warn!(
                    run_id = run.id,
                    platform = %run.platform,
                    error = %e,
                    "pipeline: collector failed"
                );
                self.store
                    .fail_run(run.id, &e.to_string(), RunCounters::default())
                    .await?;
            }
            Ok(items) => {
                let mut outcome = IngestOutcome::default();
                match self
                    .ingest_into(run.task_id, run.platform, &items, &mut outcome)
                    .await
                {
                    Ok(()) => {
                        self.store.complete_run(run.id, outcome.counters()).await?;
                        tracing::info!(
                            run_id = run.id,
                            new_items = outcome.new_items,
                            duplicates = outcome.duplicates,
                            rejected = outcome.rejected,
                            "pipeline: collection run completed"
                        );
                        if let Err(e) = self
                            .analyze_pending(run.task_id, self.settings.analyze_batch)
                            .await
                        {
                            tracing::warn!(
                                task_id = run.task_id,
                                error = %e,
                                "pipeline: post-run analysis failed"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(run_id = run.id, error = %e, "pipeline: ingestion failed");
                        self.store
                            .fail_run(run.id, &e.to_string(), outcome.counters())
                            .await?;
                    }
                }
            }
        }

        Ok(self.store.get_run(run.id).await?)
    }

    /// Opens runs for `task` and spawns each one onto the runtime.
    ///
    /// Returns the runs as created (`pending`).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if run creation fails.
    pub async fn dispatch(self: &Arc<Self>, task: &Task) -> Result<Vec<CollectionRun>, PipelineError> {
        let runs = self.open_runs(task).await?;
        for run in &runs {
            let pipeline = Arc::clone(self);
            let run = run.clone();
            let keyword = task.keyword.clone();
            tokio::spawn(async move {
                let run_id = run.id;
                if let Err(e) = pipeline.execute_run(run, &keyword).await {
                    tracing::error!(run_id, error = %e, "pipeline: collection run aborted");
                }
            });
        }
        Ok(runs)
    }

    /// One trigger firing for `task_id`.
    ///
    /// A missing task or a task that is no longer `active` is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on store failure.
    pub async fn tick(self: &Arc<Self>, task_id: i64) -> Result<Vec<CollectionRun>, PipelineError> {
        let task = match self.store.get_task(task_id).await {
            Ok(task) => task,
            Err(DbError::NotFound) => {
                tracing::debug!(task_id, "scheduler: task vanished; ignoring tick");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if task.status != TaskStatus::Active {
            tracing::debug!(task_id, status = %task.status, "scheduler: task not active; ignoring tick");
            return Ok(Vec::new());
        }
        self.dispatch(&task).await
    }

    /// Manual "collect now": like a tick but regardless of task status.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the task does not exist.
    pub async fn collect_now(
        self: &Arc<Self>,
        task_id: i64,
    ) -> Result<Vec<CollectionRun>, PipelineError> {
        let task = self.get_task(task_id).await?;
        self.dispatch(&task).await
    }

    /// Opens runs for a task and executes them concurrently, waiting for all
    /// of them to finish.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the task does not exist, or the
    /// first error from executing a run.
    pub async fn collect_and_wait(&self, task_id: i64) -> Result<Vec<CollectionRun>, PipelineError> {
        let task = self.get_task(task_id).await?;
        let runs = self.open_runs(&task).await?;
        futures::future::join_all(
            runs.into_iter()
                .map(|run| self.execute_run(run, &task.keyword)),
        )
        .await
        .into_iter()
        .collect()
    }

    /// Latest run per platform with its classification progress.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on store failure.
    pub async fn progress_for_task(
        &self,
        task_id: i64,
    ) -> Result<Vec<PlatformProgress>, PipelineError> {
        let runs = self.store.latest_runs(task_id).await?;
        if runs.is_empty() {
            return Ok(Vec::new());
        }
        let processed = self.store.count_processed_items(task_id).await?;
        Ok(runs
            .into_iter()
            .map(|run| PlatformProgress {
                platform: run.platform,
                progress: progress_percent(processed, run.counters.total_collected),
                run,
            })
            .collect())
    }

    /// A task's most recent runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on store failure.
    pub async fn list_runs(
        &self,
        task_id: i64,
        limit: i64,
    ) -> Result<Vec<CollectionRun>, PipelineError> {
        Ok(self.store.list_runs(task_id, limit).await?)
    }
}
