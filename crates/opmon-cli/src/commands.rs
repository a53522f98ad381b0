//! Command handlers for the CLI.
//!
//! Each handler drives one pipeline operation against the configured
//! database and external services, then prints a plain-text summary.

use chrono::{NaiveDate, Utc};
use opmon_core::{CollectionRun, DailyStat, Task, TaskStatus};
use opmon_pipeline::{Pipeline, SentimentDistribution};

pub(crate) async fn list_tasks(
    pipeline: &Pipeline,
    user: Option<i64>,
    status: TaskStatus,
    limit: i64,
) -> anyhow::Result<()> {
    let tasks = match user {
        Some(user_id) => pipeline.list_tasks(user_id, limit.max(1), 0).await?,
        None => {
            let mut tasks = pipeline.store().list_tasks_by_status(status).await?;
            tasks.truncate(usize::try_from(limit.max(1)).unwrap_or(usize::MAX));
            tasks
        }
    };

    if tasks.is_empty() {
        println!("no tasks found");
        return Ok(());
    }
    for task in &tasks {
        println!("{}", format_task(task));
    }
    Ok(())
}

/// Runs one collection for every platform of the task and waits for the
/// runs to finish, including the post-run analysis pass.
pub(crate) async fn collect(pipeline: &Pipeline, task_id: i64) -> anyhow::Result<()> {
    let runs = pipeline.collect_and_wait(task_id).await?;
    if runs.is_empty() {
        println!("task {task_id}: every platform already has a live run; nothing to do");
        return Ok(());
    }
    for run in &runs {
        println!("{}", format_run(run));
    }
    Ok(())
}

pub(crate) async fn analyze(pipeline: &Pipeline, task_id: i64, limit: i64) -> anyhow::Result<()> {
    pipeline.get_task(task_id).await?;
    let outcome = pipeline.analyze_pending(task_id, limit.max(1)).await?;
    println!(
        "task {task_id}: analyzed {} items, {} failed",
        outcome.analyzed, outcome.failed
    );
    Ok(())
}

pub(crate) async fn recompute(
    pipeline: &Pipeline,
    task_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<()> {
    pipeline.get_task(task_id).await?;
    let days = pipeline.recompute_range(task_id, start, end).await?;
    println!("task {task_id}: recomputed {days} days ({start} .. {end})");
    Ok(())
}

pub(crate) async fn stats(pipeline: &Pipeline, task_id: i64, days: u32) -> anyhow::Result<()> {
    let task = pipeline.get_task(task_id).await?;
    let trend = pipeline
        .trend(task_id, days, Utc::now().date_naive())
        .await?;

    println!("task {} ({}): last {days} days", task.id, task.keyword);
    if trend.is_empty() {
        println!("  no classified items in range");
        return Ok(());
    }
    for stat in &trend {
        println!("  {}", format_daily(stat));
    }
    println!("  {}", format_distribution(&SentimentDistribution::from_stats(&trend)));
    Ok(())
}

fn format_task(task: &Task) -> String {
    format!(
        "#{} [{}] user={} keyword={:?} platforms={}",
        task.id,
        task.status,
        task.user_id,
        task.keyword,
        task.platforms.to_strings().join(",")
    )
}

fn format_run(run: &CollectionRun) -> String {
    let mut line = format!(
        "run #{} {} {}: collected={} new={} duplicates={}",
        run.id,
        run.platform,
        run.status,
        run.counters.total_collected,
        run.counters.new_items,
        run.counters.duplicates
    );
    if let Some(error) = &run.error_message {
        line.push_str(&format!(" error={error:?}"));
    }
    line
}

fn format_daily(stat: &DailyStat) -> String {
    let average = stat
        .counts
        .average_score
        .map_or_else(|| "-".to_string(), |avg| format!("{avg:.4}"));
    format!(
        "{} total={} positive={} neutral={} negative={} avg={average}",
        stat.date, stat.counts.total, stat.counts.positive, stat.counts.neutral, stat.counts.negative
    )
}

fn format_distribution(dist: &SentimentDistribution) -> String {
    format!(
        "overall total={} positive={:.1}% neutral={:.1}% negative={:.1}%",
        dist.total, dist.positive_rate, dist.neutral_rate, dist.negative_rate
    )
}
