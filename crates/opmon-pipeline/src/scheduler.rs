//! Per-task collection triggers.
//!
//! [`TaskScheduler`] owns a [`JobScheduler`] and a registry mapping each armed
//! task to its job. A task has at most one job; re-arming replaces it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use opmon_core::{CollectionRun, Task, TaskStatus};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::Pipeline;

/// How often a task's trigger fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cadence {
    /// Six-field cron expression (`sec min hour day month weekday`).
    Cron(String),
    Every(Duration),
}

#[derive(Debug, Clone)]
struct Armed {
    job_id: Uuid,
    cadence: Cadence,
}

pub struct TaskScheduler {
    pipeline: Arc<Pipeline>,
    jobs: JobScheduler,
    registry: Mutex<HashMap<i64, Armed>>,
    #[cfg(test)]
    reject_next_add: std::sync::atomic::AtomicBool,
}

impl TaskScheduler {
    /// Creates and starts the underlying job runner. No task is armed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Scheduler`] if the job runner cannot start.
    pub async fn new(pipeline: Arc<Pipeline>) -> Result<Self, PipelineError> {
        let jobs = JobScheduler::new().await?;
        jobs.start().await?;
        Ok(Self {
            pipeline,
            jobs,
            registry: Mutex::new(HashMap::new()),
            #[cfg(test)]
            reject_next_add: std::sync::atomic::AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Arms `task_id` and marks it `active`. An existing trigger for the task
    /// is removed before the new one is installed. `None` uses the
    /// configured default cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the task does not exist, or
    /// [`PipelineError::InvalidInterval`] for a bad cadence; in both cases
    /// any existing trigger is left in place. Returns
    /// [`PipelineError::Scheduler`] if the job runner rejects the new
    /// trigger; the previous trigger is then reinstalled and the task
    /// status is not changed.
    pub async fn start(
        &self,
        task_id: i64,
        cadence: Option<Cadence>,
    ) -> Result<Task, PipelineError> {
        self.pipeline.get_task(task_id).await?;
        let cadence = cadence
            .unwrap_or_else(|| Cadence::Cron(self.pipeline.settings().default_interval.clone()));
        let job = self.build_job(task_id, &cadence)?;

        let mut registry = self.registry.lock().await;
        let previous = registry.remove(&task_id);
        if let Some(old) = &previous {
            if let Err(e) = self.jobs.remove(&old.job_id).await {
                registry.insert(task_id, old.clone());
                return Err(e.into());
            }
        }
        match self.add_job(job).await {
            Ok(job_id) => {
                registry.insert(
                    task_id,
                    Armed {
                        job_id,
                        cadence: cadence.clone(),
                    },
                );
            }
            Err(e) => {
                if let Some(old) = previous {
                    self.reinstall(&mut registry, task_id, old).await;
                }
                return Err(e);
            }
        }
        drop(registry);

        let task = self
            .pipeline
            .set_task_status(task_id, TaskStatus::Active)
            .await?;
        tracing::info!(task_id, cadence = ?cadence, "scheduler: task armed");
        Ok(task)
    }

    /// Disarms `task_id` (if armed) and marks it `paused`. Runs already in
    /// flight finish on their own.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the task does not exist.
    pub async fn stop(&self, task_id: i64) -> Result<Task, PipelineError> {
        self.pipeline.get_task(task_id).await?;
        self.disarm(task_id).await?;
        self.pipeline
            .set_task_status(task_id, TaskStatus::Paused)
            .await
    }

    /// Explicit status change. `paused` and `completed` also disarm the task;
    /// `active` does not arm it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the task does not exist.
    pub async fn update_task_status(
        &self,
        task_id: i64,
        status: TaskStatus,
    ) -> Result<Task, PipelineError> {
        let task = self.pipeline.set_task_status(task_id, status).await?;
        if status != TaskStatus::Active {
            self.disarm(task_id).await?;
        }
        Ok(task)
    }

    /// Fires the trigger body for `task_id` once.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on store failure.
    pub async fn tick(&self, task_id: i64) -> Result<Vec<CollectionRun>, PipelineError> {
        self.pipeline.tick(task_id).await
    }

    /// Manual collection regardless of task status.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the task does not exist.
    pub async fn collect_now(&self, task_id: i64) -> Result<Vec<CollectionRun>, PipelineError> {
        self.pipeline.collect_now(task_id).await
    }

    /// Arms every task whose persisted status is `active` with the default
    /// cadence. Returns how many tasks were armed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if listing tasks fails, or
    /// [`PipelineError::InvalidInterval`] if the default cadence is invalid.
    pub async fn bootstrap(&self) -> Result<usize, PipelineError> {
        let tasks = self
            .pipeline
            .store()
            .list_tasks_by_status(TaskStatus::Active)
            .await?;
        let mut armed = 0;
        for task in &tasks {
            match self.start(task.id, None).await {
                Ok(_) => armed += 1,
                Err(PipelineError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::info!(armed, "scheduler: bootstrap complete");
        Ok(armed)
    }

    /// Task ids with a live trigger, ascending.
    pub async fn scheduled_tasks(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.registry.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Removes every trigger and stops the job runner.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Scheduler`] if the job runner fails to stop.
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        let mut registry = self.registry.lock().await;
        for (task_id, armed) in registry.drain() {
            if let Err(e) = self.jobs.remove(&armed.job_id).await {
                tracing::warn!(task_id, error = %e, "scheduler: failed to remove trigger");
            }
        }
        drop(registry);
        let mut jobs = self.jobs.clone();
        jobs.shutdown().await?;
        tracing::info!("scheduler: shut down");
        Ok(())
    }

    async fn disarm(&self, task_id: i64) -> Result<(), PipelineError> {
        let removed = self.registry.lock().await.remove(&task_id);
        if let Some(armed) = removed {
            self.jobs.remove(&armed.job_id).await?;
            tracing::info!(task_id, "scheduler: task disarmed");
        }
        Ok(())
    }

    async fn add_job(&self, job: Job) -> Result<Uuid, PipelineError> {
        #[cfg(test)]
        if self
            .reject_next_add
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(PipelineError::Scheduler(
                "job runner rejected the trigger".to_string(),
            ));
        }
        Ok(self.jobs.add(job).await?)
    }

    /// Puts a removed trigger back after a failed replacement.
    async fn reinstall(&self, registry: &mut HashMap<i64, Armed>, task_id: i64, old: Armed) {
        let restored = match self.build_job(task_id, &old.cadence) {
            Ok(job) => self.add_job(job).await,
            Err(e) => Err(e),
        };
        match restored {
            Ok(job_id) => {
                registry.insert(
                    task_id,
                    Armed {
                        job_id,
                        cadence: old.cadence,
                    },
                );
                tracing::warn!(task_id, "scheduler: replacement failed; previous trigger restored");
            }
            Err(e) => {
                tracing::error!(
                    task_id,
                    error = %e,
                    "scheduler: replacement failed and previous trigger could not be restored"
                );
            }
        }
    }

    fn build_job(&self, task_id: i64, cadence: &Cadence) -> Result<Job, PipelineError> {
        let pipeline = Arc::clone(&self.pipeline);
        let run = move |_uuid: Uuid, _lock: JobScheduler| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move {
                match pipeline.tick(task_id).await {
                    Ok(runs) => tracing::debug!(
                        task_id,
                        runs = runs.len(),
                        "scheduler: trigger fired"
                    ),
                    Err(e) => tracing::error!(task_id, error = %e, "scheduler: tick failed"),
                }
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        };

        match cadence {
            Cadence::Cron(expr) => Job::new_async(expr.as_str(), run)
                .map_err(|e| PipelineError::InvalidInterval(format!("{expr}: {e}"))),
            Cadence::Every(period) if period.is_zero() => Err(PipelineError::InvalidInterval(
                "period must be greater than zero".to_string(),
            )),
            Cadence::Every(period) => Job::new_repeated_async(*period, run)
                .map_err(|e| PipelineError::InvalidInterval(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_pipeline;

    async fn scheduler_with_task() -> (TaskScheduler, i64, crate::testing::TestDoubles) {
        let (pipeline, doubles) = test_pipeline();
        let task = pipeline
            .create_task(1, "kw", None, &["twitter"])
            .await
            .unwrap();
        let scheduler = TaskScheduler::new(pipeline).await.unwrap();
        (scheduler, task.id, doubles)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn double_start_keeps_one_trigger() {
        let (scheduler, task_id, _) = scheduler_with_task().await;

        scheduler.start(task_id, None).await.unwrap();
        scheduler
            .start(task_id, Some(Cadence::Cron("0 0 * * * *".to_string())))
            .await
            .unwrap();

        assert_eq!(scheduler.scheduled_tasks().await, vec![task_id]);
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_without_trigger_pauses_task() {
        let (scheduler, task_id, _) = scheduler_with_task().await;

        let task = scheduler.stop(task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Paused);
        assert!(scheduler.scheduled_tasks().await.is_empty());

        let again = scheduler.stop(task_id).await.unwrap();
        assert_eq!(again.status, TaskStatus::Paused);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_after_stop_reactivates() {
        let (scheduler, task_id, _) = scheduler_with_task().await;
        scheduler.start(task_id, None).await.unwrap();
        scheduler.stop(task_id).await.unwrap();
        assert!(scheduler.scheduled_tasks().await.is_empty());

        let task = scheduler.start(task_id, None).await.unwrap();
        assert_eq!(task.status, TaskStatus::Active);
        assert_eq!(scheduler.scheduled_tasks().await, vec![task_id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_cron_leaves_existing_trigger() {
        let (scheduler, task_id, _) = scheduler_with_task().await;
        scheduler.start(task_id, None).await.unwrap();

        let err = scheduler
            .start(task_id, Some(Cadence::Cron("not a cron".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInterval(_)));
        assert_eq!(scheduler.scheduled_tasks().await, vec![task_id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejected_replacement_restores_previous_trigger() {
        let (scheduler, task_id, doubles) = scheduler_with_task().await;
        scheduler
            .start(task_id, Some(Cadence::Every(Duration::from_secs(1))))
            .await
            .unwrap();
        scheduler
            .pipeline()
            .set_task_status(task_id, TaskStatus::Paused)
            .await
            .unwrap();

        scheduler
            .reject_next_add
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let err = scheduler
            .start(task_id, Some(Cadence::Cron("0 0 * * * *".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Scheduler(_)));
        assert_eq!(scheduler.scheduled_tasks().await, vec![task_id]);
        assert_eq!(
            scheduler.pipeline().get_task(task_id).await.unwrap().status,
            TaskStatus::Paused
        );

        scheduler
            .pipeline()
            .set_task_status(task_id, TaskStatus::Active)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.shutdown().await.unwrap();
        assert!(doubles.collector.calls() >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejected_first_arm_leaves_status_untouched() {
        let (scheduler, task_id, _) = scheduler_with_task().await;
        scheduler
            .pipeline()
            .set_task_status(task_id, TaskStatus::Paused)
            .await
            .unwrap();

        scheduler
            .reject_next_add
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(scheduler.start(task_id, None).await.is_err());
        assert!(scheduler.scheduled_tasks().await.is_empty());
        assert_eq!(
            scheduler.pipeline().get_task(task_id).await.unwrap().status,
            TaskStatus::Paused
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn zero_period_is_invalid() {
        let (scheduler, task_id, _) = scheduler_with_task().await;
        let err = scheduler
            .start(task_id, Some(Cadence::Every(Duration::ZERO)))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInterval(_)));
        assert!(scheduler.scheduled_tasks().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unknown_task_is_not_found() {
        let (scheduler, _, _) = scheduler_with_task().await;
        assert!(matches!(
            scheduler.start(999, None).await,
            Err(PipelineError::NotFound)
        ));
        assert!(matches!(
            scheduler.stop(999).await,
            Err(PipelineError::NotFound)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn completing_a_task_disarms_it() {
        let (scheduler, task_id, _) = scheduler_with_task().await;
        scheduler.start(task_id, None).await.unwrap();

        let task = scheduler
            .update_task_status(task_id, TaskStatus::Completed)
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(scheduler.scheduled_tasks().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn bootstrap_arms_only_active_tasks() {
        let (pipeline, _) = test_pipeline();
        let active = pipeline.create_task(1, "a", None, &["reddit"]).await.unwrap();
        let paused = pipeline.create_task(1, "b", None, &["reddit"]).await.unwrap();
        pipeline
            .set_task_status(paused.id, TaskStatus::Paused)
            .await
            .unwrap();

        let scheduler = TaskScheduler::new(pipeline).await.unwrap();
        assert_eq!(scheduler.bootstrap().await.unwrap(), 1);
        assert_eq!(scheduler.scheduled_tasks().await, vec![active.id]);

        scheduler.shutdown().await.unwrap();
        assert!(scheduler.scheduled_tasks().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn periodic_trigger_collects() {
        let (scheduler, task_id, doubles) = scheduler_with_task().await;
        scheduler
            .start(task_id, Some(Cadence::Every(Duration::from_secs(1))))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        scheduler.shutdown().await.unwrap();

        assert!(doubles.collector.calls() >= 1);
    }
}
