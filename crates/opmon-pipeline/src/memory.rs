//! In-memory [`ContentStore`] for tests and local runs without Postgres.
//!
//! Mirrors the database constraints the pipeline depends on: global
//! `native_id` uniqueness, one live run per (task, platform), and
//! status-guarded run transitions.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use opmon_core::{
    ClassifiedItem, CollectionRun, DailyCounts, DailyStat, Item, NewTask, Platform, RawItem, RunCounters,
    RunStatus, Sentiment, SentimentLabel, Task, TaskStatus,
};
use opmon_db::DbError;
use uuid::Uuid;

use crate::store::ContentStore;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    tasks: BTreeMap<i64, Task>,
    runs: BTreeMap<i64, CollectionRun>,
    items: BTreeMap<i64, Item>,
    native_ids: HashSet<String>,
    sentiments: HashMap<i64, (Sentiment, DateTime<Utc>)>,
    analysis_attempts: HashMap<i64, i32>,
    daily: BTreeMap<(i64, NaiveDate), DailyCounts>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn transition(
        &self,
        id: i64,
        expected: RunStatus,
        apply: impl FnOnce(&mut CollectionRun),
    ) -> Result<(), DbError> {
        let mut state = self.lock();
        match state.runs.get_mut(&id) {
            Some(run) if run.status == expected => {
                apply(run);
                Ok(())
            }
            _ => Err(DbError::InvalidCollectionRunTransition {
                id,
                expected_status: expected.as_str(),
            }),
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn create_task(&self, task: &NewTask) -> Result<Task, DbError> {
        let mut state = self.lock();
        let id = state.next_id();
        let now = Utc::now();
        let created = Task {
            id,
            user_id: task.user_id,
            keyword: task.keyword.clone(),
            description: task.description.clone(),
            platforms: task.platforms.clone(),
            status: TaskStatus::Active,
            created_at: now,
            updated_at: now,
        };
        state.tasks.insert(id, created.clone());
        Ok(created)
    }

    async fn get_task(&self, id: i64) -> Result<Task, DbError> {
        self.lock().tasks.get(&id).cloned().ok_or(DbError::NotFound)
    }

    async fn list_tasks_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Task>, DbError> {
        let state = self.lock();
        Ok(state
            .tasks
            .values()
            .rev()
            .filter(|t| t.user_id == user_id)
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, DbError> {
        Ok(self
            .lock()
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn set_task_status(&self, id: i64, status: TaskStatus) -> Result<Task, DbError> {
        let mut state = self.lock();
        let task = state.tasks.get_mut(&id).ok_or(DbError::NotFound)?;
        task.status = status;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn create_run_if_idle(
        &self,
        task_id: i64,
        platform: Platform,
    ) -> Result<Option<CollectionRun>, DbError> {
        let mut state = self.lock();
        let blocked = state
            .runs
            .values()
            .any(|r| r.task_id == task_id && r.platform == platform && r.status.is_live());
        if blocked {
            return Ok(None);
        }
        let id = state.next_id();
        let run = CollectionRun {
            id,
            public_id: Uuid::new_v4(),
            task_id,
            platform,
            status: RunStatus::Pending,
            counters: RunCounters::default(),
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        };
        state.runs.insert(id, run.clone());
        Ok(Some(run))
    }

    async fn start_run(&self, id: i64) -> Result<(), DbError> {
        self.transition(id, RunStatus::Pending, |run| {
            run.status = RunStatus::Running;
            run.started_at = Some(Utc::now());
        })
    }

    async fn complete_run(&self, id: i64, counters: RunCounters) -> Result<(), DbError> {
        self.transition(id, RunStatus::Running, |run| {
            run.status = RunStatus::Completed;
            run.counters = counters;
            run.completed_at = Some(Utc::now());
        })
    }

    async fn fail_run(
        &self,
        id: i64,
        message: &str,
        counters: RunCounters,
    ) -> Result<(), DbError> {
        self.transition(id, RunStatus::Running, |run| {
            run.status = RunStatus::Failed;
            run.counters = counters;
            run.error_message = Some(message.to_string());
            run.completed_at = Some(Utc::now());
        })
    }

    async fn get_run(&self, id: i64) -> Result<CollectionRun, DbError> {
        self.lock().runs.get(&id).cloned().ok_or(DbError::NotFound)
    }

    async fn latest_runs(&self, task_id: i64) -> Result<Vec<CollectionRun>, DbError> {
        let state = self.lock();
        let mut latest: BTreeMap<&str, &CollectionRun> = BTreeMap::new();
        for run in state.runs.values().filter(|r| r.task_id == task_id) {
            let entry = latest.entry(run.platform.as_str()).or_insert(run);
            if (run.created_at, run.id) > (entry.created_at, entry.id) {
                *entry = run;
            }
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn list_runs(&self, task_id: i64, limit: i64) -> Result<Vec<CollectionRun>, DbError> {
        let state = self.lock();
        let mut runs: Vec<CollectionRun> = state
            .runs
            .values()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        runs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(runs)
    }

    async fn insert_item_if_absent(
        &self,
        task_id: i64,
        platform: Platform,
        item: &RawItem,
        ingested_at: DateTime<Utc>,
    ) -> Result<Option<i64>, DbError> {
        let mut state = self.lock();
        let native_id = item.native_id.trim().to_string();
        if state.native_ids.contains(&native_id) {
            return Ok(None);
        }
        let id = state.next_id();
        state.native_ids.insert(native_id.clone());
        state.items.insert(
            id,
            Item {
                id,
                task_id,
                platform,
                native_id,
                author: item.author.clone(),
                body: item.body.clone(),
                like_count: item.like_count,
                reply_count: item.reply_count,
                share_count: item.share_count,
                url: item.url.clone(),
                published_at: item.published_at.unwrap_or(ingested_at),
                ingested_at,
            },
        );
        Ok(Some(id))
    }

    async fn list_items(
        &self,
        task_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Item>, DbError> {
        let state = self.lock();
        let mut items: Vec<Item> = state
            .items
            .values()
            .filter(|i| i.task_id == task_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| (b.published_at, b.id).cmp(&(a.published_at, a.id)));
        Ok(items
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn items_without_sentiment(
        &self,
        task_id: i64,
        limit: i64,
    ) -> Result<Vec<Item>, DbError> {
        let state = self.lock();
        let mut pending: Vec<&Item> = state
            .items
            .values()
            .filter(|i| i.task_id == task_id && !state.sentiments.contains_key(&i.id))
            .collect();
        pending.sort_by_key(|i| {
            (
                state.analysis_attempts.get(&i.id).copied().unwrap_or(0),
                i.id,
            )
        });
        Ok(pending
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn record_analysis_failure(
        &self,
        item_id: i64,
        _attempted_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut state = self.lock();
        if !state.items.contains_key(&item_id) {
            return Err(DbError::NotFound);
        }
        *state.analysis_attempts.entry(item_id).or_insert(0) += 1;
        Ok(())
    }

    async fn item_bodies(&self, task_id: i64) -> Result<Vec<String>, DbError> {
        Ok(self
            .lock()
            .items
            .values()
            .filter(|i| i.task_id == task_id)
            .map(|i| i.body.clone())
            .collect())
    }

    async fn count_processed_items(&self, task_id: i64) -> Result<i64, DbError> {
        let state = self.lock();
        let count = state
            .items
            .values()
            .filter(|i| i.task_id == task_id && state.sentiments.contains_key(&i.id))
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn insert_sentiment_if_absent(
        &self,
        item_id: i64,
        sentiment: &Sentiment,
    ) -> Result<bool, DbError> {
        let mut state = self.lock();
        if !state.items.contains_key(&item_id) {
            return Err(DbError::NotFound);
        }
        if state.sentiments.contains_key(&item_id) {
            return Ok(false);
        }
        state.sentiments.insert(item_id, (*sentiment, Utc::now()));
        Ok(true)
    }

    async fn list_classified_items(
        &self,
        task_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ClassifiedItem>, DbError> {
        let state = self.lock();
        let mut classified: Vec<ClassifiedItem> = state
            .items
            .values()
            .filter(|i| i.task_id == task_id)
            .filter_map(|item| {
                state
                    .sentiments
                    .get(&item.id)
                    .map(|&(sentiment, analyzed_at)| ClassifiedItem {
                        item: item.clone(),
                        sentiment,
                        analyzed_at,
                    })
            })
            .collect();
        classified.sort_by(|a, b| (b.analyzed_at, b.item.id).cmp(&(a.analyzed_at, a.item.id)));
        Ok(classified
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn scan_daily_counts(
        &self,
        task_id: i64,
        date: NaiveDate,
    ) -> Result<DailyCounts, DbError> {
        let state = self.lock();
        let mut counts = DailyCounts::default();
        let mut score_sum = 0.0;
        for item in state
            .items
            .values()
            .filter(|i| i.task_id == task_id && i.published_at.date_naive() == date)
        {
            let Some((sentiment, _)) = state.sentiments.get(&item.id) else {
                continue;
            };
            counts.total += 1;
            match sentiment.label {
                SentimentLabel::Positive => counts.positive += 1,
                SentimentLabel::Neutral => counts.neutral += 1,
                SentimentLabel::Negative => counts.negative += 1,
            }
            score_sum += round4(sentiment.score);
        }
        if counts.total > 0 {
            counts.average_score = Some(round4(score_sum / f64::from(counts.total)));
        }
        Ok(counts)
    }

    async fn write_daily_stat(
        &self,
        task_id: i64,
        date: NaiveDate,
        counts: &DailyCounts,
    ) -> Result<(), DbError> {
        let mut state = self.lock();
        if counts.is_empty() {
            state.daily.remove(&(task_id, date));
        } else {
            state.daily.insert((task_id, date), *counts);
        }
        Ok(())
    }

    async fn daily_stats(
        &self,
        task_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStat>, DbError> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .lock()
            .daily
            .range((task_id, start)..=(task_id, end))
            .map(|(&(task_id, date), counts)| DailyStat {
                task_id,
                date,
                counts: *counts,
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }
}
