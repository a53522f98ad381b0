mod api;
mod middleware;

use std::sync::Arc;

use opmon_pipeline::{HttpCollector, NlpClient, PgStore, Pipeline, PipelineSettings, TaskScheduler};
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = opmon_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::info!(env = %config.env, bind_addr = %config.bind_addr, "starting opmon-server");

    let pool_config = opmon_db::PoolConfig::from_app_config(&config);
    let pool = opmon_db::connect_pool(&config.database_url, pool_config).await?;
    opmon_db::run_migrations(&pool).await?;

    let collector = HttpCollector::new(&config.collector_url, config.http_timeout_secs)?;
    let nlp = Arc::new(NlpClient::new(
        &config.nlp_url,
        &config.nlp_language,
        config.http_timeout_secs,
    )?);
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(collector),
        nlp.clone(),
        nlp,
        PipelineSettings::from_app_config(&config),
    ));

    let scheduler = Arc::new(TaskScheduler::new(Arc::clone(&pipeline)).await?);
    if config.bootstrap_on_start {
        let armed = scheduler.bootstrap().await?;
        tracing::info!(armed, "re-armed active tasks");
    }

    let app = build_app(AppState {
        pipeline,
        scheduler: Arc::clone(&scheduler),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
