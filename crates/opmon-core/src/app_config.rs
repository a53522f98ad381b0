use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Base URL of the external collector service.
    pub collector_url: String,
    /// Base URL of the NLP service (sentiment + keyword extraction).
    pub nlp_url: String,
    pub nlp_language: String,
    pub http_timeout_secs: u64,
    /// Items requested from the collector per platform per run.
    pub collect_count: u32,
    /// Six-field cron expression used when a task is armed without an explicit interval.
    pub default_interval: String,
    pub analyze_batch: i64,
    pub analyze_concurrency: usize,
    /// Re-arm every `active` task at server start.
    pub bootstrap_on_start: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("collector_url", &self.collector_url)
            .field("nlp_url", &self.nlp_url)
            .field("nlp_language", &self.nlp_language)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("collect_count", &self.collect_count)
            .field("default_interval", &self.default_interval)
            .field("analyze_batch", &self.analyze_batch)
            .field("analyze_concurrency", &self.analyze_concurrency)
            .field("bootstrap_on_start", &self.bootstrap_on_start)
            .finish()
    }
}
