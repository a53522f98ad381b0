//! Offline unit tests for opmon-db pool configuration and row conversions.
//! These tests do not require a live database connection.

use chrono::{NaiveDate, Utc};
use opmon_core::{
    AppConfig, CollectionRun, DailyStat, Environment, Item, Platform, RunStatus, Task, TaskStatus,
};
use opmon_db::{CollectionRunRow, DailyStatRow, DbError, ItemRow, PoolConfig, TaskRow};
use rust_decimal::Decimal;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use uuid::Uuid;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        collector_url: "http://collector".to_string(),
        nlp_url: "http://nlp".to_string(),
        nlp_language: "zh".to_string(),
        http_timeout_secs: 30,
        collect_count: 20,
        default_interval: "0 */30 * * * *".to_string(),
        analyze_batch: 200,
        analyze_concurrency: 4,
        bootstrap_on_start: false,
    }
}

fn task_row(platforms: &[&str], status: &str) -> TaskRow {
    TaskRow {
        id: 1,
        user_id: 10,
        keyword: "rust".to_string(),
        description: None,
        platforms: platforms.iter().map(|p| (*p).to_string()).collect(),
        status: status.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn task_row_converts_with_ordered_platforms() {
    let task = Task::try_from(task_row(&["reddit", "twitter"], "paused")).unwrap();
    assert_eq!(
        task.platforms.as_slice(),
        &[Platform::Reddit, Platform::Twitter]
    );
    assert_eq!(task.status, TaskStatus::Paused);
}

#[test]
fn task_row_with_unknown_platform_fails_decode() {
    let result = Task::try_from(task_row(&["geocities"], "active"));
    assert!(matches!(result, Err(DbError::Decode(_))));
}

#[test]
fn task_row_with_unknown_status_fails_decode() {
    let result = Task::try_from(task_row(&["weibo"], "archived"));
    assert!(matches!(result, Err(DbError::Decode(_))));
}

#[test]
fn collection_run_row_converts() {
    let row = CollectionRunRow {
        id: 5,
        public_id: Uuid::new_v4(),
        task_id: 1,
        platform: "zhihu".to_string(),
        status: "completed".to_string(),
        total_collected: 10,
        new_items: 7,
        duplicates: 3,
        error_message: None,
        started_at: Some(Utc::now()),
        completed_at: Some(Utc::now()),
        created_at: Utc::now(),
    };

    let run = CollectionRun::try_from(row).unwrap();
    assert_eq!(run.platform, Platform::Zhihu);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        run.counters.new_items + run.counters.duplicates,
        run.counters.total_collected
    );
}

#[test]
fn item_row_converts() {
    let row = ItemRow {
        id: 3,
        task_id: 1,
        platform: "youtube".to_string(),
        native_id: "yt-1".to_string(),
        author: Some("someone".to_string()),
        body: "great video".to_string(),
        like_count: 4,
        reply_count: 0,
        share_count: 1,
        url: None,
        published_at: Utc::now(),
        ingested_at: Utc::now(),
    };

    let item = Item::try_from(row).unwrap();
    assert_eq!(item.platform, Platform::Youtube);
    assert_eq!(item.native_id, "yt-1");
}

#[test]
fn daily_stat_row_converts_average_score() {
    let row = DailyStatRow {
        id: 1,
        task_id: 1,
        stat_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        total_count: 4,
        positive_count: 2,
        neutral_count: 1,
        negative_count: 1,
        average_score: Some(Decimal::new(6250, 4)),
        updated_at: Utc::now(),
    };

    let stat = DailyStat::from(row);
    assert_eq!(stat.counts.total, 4);
    assert_eq!(stat.counts.average_score, Some(0.625));
}

#[test]
fn migrations_directory_exists() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    assert!(path.is_dir(), "expected migrations at {}", path.display());
}
