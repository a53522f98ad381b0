use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::str::FromStr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    fn parsed<T>(var: &str, raw: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    }

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("OPMON_ENV", "development"));

    let bind_addr: SocketAddr = parsed(
        "OPMON_BIND_ADDR",
        &or_default("OPMON_BIND_ADDR", "0.0.0.0:3000"),
    )?;
    let log_level = or_default("OPMON_LOG_LEVEL", "info");

    let db_max_connections: u32 = parsed(
        "OPMON_DB_MAX_CONNECTIONS",
        &or_default("OPMON_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections: u32 = parsed(
        "OPMON_DB_MIN_CONNECTIONS",
        &or_default("OPMON_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs: u64 = parsed(
        "OPMON_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("OPMON_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let collector_url = trim_base_url(&or_default(
        "OPMON_COLLECTOR_URL",
        "http://127.0.0.1:8001",
    ));
    let nlp_url = trim_base_url(&or_default("OPMON_NLP_URL", "http://127.0.0.1:8000"));
    let nlp_language = or_default("OPMON_NLP_LANGUAGE", "zh");
    let http_timeout_secs: u64 = parsed(
        "OPMON_HTTP_TIMEOUT_SECS",
        &or_default("OPMON_HTTP_TIMEOUT_SECS", "30"),
    )?;
    let collect_count: u32 = parsed(
        "OPMON_COLLECT_COUNT",
        &or_default("OPMON_COLLECT_COUNT", "20"),
    )?;
    let default_interval = or_default("OPMON_DEFAULT_INTERVAL", "0 */30 * * * *");
    let analyze_batch: i64 = parsed(
        "OPMON_ANALYZE_BATCH",
        &or_default("OPMON_ANALYZE_BATCH", "200"),
    )?;
    let analyze_concurrency: usize = parsed(
        "OPMON_ANALYZE_CONCURRENCY",
        &or_default("OPMON_ANALYZE_CONCURRENCY", "4"),
    )?;
    let bootstrap_on_start: bool = parsed(
        "OPMON_BOOTSTRAP_ON_START",
        &or_default("OPMON_BOOTSTRAP_ON_START", "false"),
    )?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        collector_url,
        nlp_url,
        nlp_language,
        http_timeout_secs,
        collect_count,
        default_interval,
        analyze_batch,
        analyze_concurrency,
        bootstrap_on_start,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

fn trim_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
