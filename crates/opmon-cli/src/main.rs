mod commands;

use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use opmon_core::{AppConfig, TaskStatus};
use opmon_pipeline::{HttpCollector, NlpClient, PgStore, Pipeline, PipelineSettings};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "opmon-cli")]
#[command(about = "Keyword opinion monitor command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// List monitoring tasks
    Tasks {
        /// Only tasks owned by this user
        #[arg(long)]
        user: Option<i64>,

        /// Status filter when no user is given
        #[arg(long, default_value = "active", value_parser = parse_status)]
        status: TaskStatus,

        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Collect a task's keyword from every platform and wait for the runs
    Collect {
        #[arg(long)]
        task: i64,
    },
    /// Classify a task's unclassified items
    Analyze {
        #[arg(long)]
        task: i64,

        /// Maximum items in this pass (defaults to the configured batch size)
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Rebuild daily aggregates for a date range (inclusive)
    Recompute {
        #[arg(long)]
        task: i64,

        #[arg(long)]
        start: NaiveDate,

        #[arg(long)]
        end: NaiveDate,
    },
    /// Show the sentiment trend of the last N days
    Stats {
        #[arg(long)]
        task: i64,

        #[arg(long, default_value_t = opmon_pipeline::DEFAULT_TREND_DAYS)]
        days: u32,
    },
}

fn parse_status(raw: &str) -> Result<TaskStatus, String> {
    raw.parse().map_err(|e: opmon_core::CoreError| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("opmon-cli: no command given; see --help");
        return Ok(());
    };

    let config = opmon_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = opmon_db::PoolConfig::from_app_config(&config);
    let pool = opmon_db::connect_pool(&config.database_url, pool_config).await?;

    if matches!(command, Commands::Migrate) {
        let applied = opmon_db::run_migrations(&pool).await?;
        println!("migrations applied: {applied}");
        return Ok(());
    }

    let pipeline = build_pipeline(&config, pool)?;
    match command {
        Commands::Migrate => {}
        Commands::Tasks {
            user,
            status,
            limit,
        } => commands::list_tasks(&pipeline, user, status, limit).await?,
        Commands::Collect { task } => commands::collect(&pipeline, task).await?,
        Commands::Analyze { task, limit } => {
            let limit = limit.unwrap_or(pipeline.settings().analyze_batch);
            commands::analyze(&pipeline, task, limit).await?;
        }
        Commands::Recompute { task, start, end } => {
            commands::recompute(&pipeline, task, start, end).await?;
        }
        Commands::Stats { task, days } => commands::stats(&pipeline, task, days).await?,
    }

    Ok(())
}

fn build_pipeline(config: &AppConfig, pool: sqlx::PgPool) -> anyhow::Result<Pipeline> {
    let collector = HttpCollector::new(&config.collector_url, config.http_timeout_secs)?;
    let nlp = Arc::new(NlpClient::new(
        &config.nlp_url,
        &config.nlp_language,
        config.http_timeout_secs,
    )?);
    Ok(Pipeline::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(collector),
        nlp.clone(),
        nlp,
        PipelineSettings::from_app_config(config),
    ))
}

#[cfg(test)]
mod tests;
