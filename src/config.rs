use serde::Deserialize;
use std::time::Duration;

use crate::query::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub rollup: RollupConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
    /// Raw samples older than this are pruned. Rollups are kept.
    #[serde(default = "default_sample_retention_days")]
    pub sample_retention_days: u32,
}

fn default_sample_retention_days() -> u32 {
    90
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Total attempts for idempotent reads (first try included).
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Queries slower than this are logged at WARN.
    pub slow_query_ms: u64,
    /// Per-attempt time budget; exceeding it is a transient (retryable) failure.
    pub query_timeout_ms: u64,
    pub default_page_limit: u64,
    pub max_page_limit: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 100,
            slow_query_ms: 1000,
            query_timeout_ms: 5000,
            default_page_limit: 20,
            max_page_limit: 100,
        }
    }
}

impl QueryConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            attempt_timeout: Some(self.query_timeout()),
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    pub enable_worker: bool,
    pub aggregation_interval_secs: u64,
    pub reprocess_hours: u32,
    /// Hours rolled once at startup; 0 disables backfill.
    pub backfill_hours: u32,
    /// Cron expression (sec min hour dom mon dow) for VACUUM, local time.
    pub vacuum_schedule: Option<String>,
    pub vacuum_interval_secs: u64,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            enable_worker: true,
            aggregation_interval_secs: 300,
            reprocess_hours: 1,
            backfill_hours: 24,
            vacuum_schedule: None,
            vacuum_interval_secs: 24 * 60 * 60,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.database.sample_retention_days > 0,
            "database.sample_retention_days must be > 0, got {}",
            self.database.sample_retention_days
        );
        anyhow::ensure!(
            self.cache.ttl_seconds > 0,
            "cache.ttl_seconds must be > 0, got {}",
            self.cache.ttl_seconds
        );
        anyhow::ensure!(
            self.query.max_retries > 0,
            "query.max_retries must be > 0, got {}",
            self.query.max_retries
        );
        anyhow::ensure!(
            self.query.query_timeout_ms > 0,
            "query.query_timeout_ms must be > 0, got {}",
            self.query.query_timeout_ms
        );
        anyhow::ensure!(
            self.query.default_page_limit > 0,
            "query.default_page_limit must be > 0, got {}",
            self.query.default_page_limit
        );
        anyhow::ensure!(
            self.query.max_page_limit >= self.query.default_page_limit,
            "query.max_page_limit must be >= query.default_page_limit ({}), got {}",
            self.query.default_page_limit,
            self.query.max_page_limit
        );
        anyhow::ensure!(
            self.rollup.aggregation_interval_secs > 0,
            "rollup.aggregation_interval_secs must be > 0, got {}",
            self.rollup.aggregation_interval_secs
        );
        anyhow::ensure!(
            self.rollup.vacuum_interval_secs > 0,
            "rollup.vacuum_interval_secs must be > 0, got {}",
            self.rollup.vacuum_interval_secs
        );
        if let Some(expr) = &self.rollup.vacuum_schedule {
            anyhow::ensure!(
                <cron::Schedule as std::str::FromStr>::from_str(expr).is_ok(),
                "rollup.vacuum_schedule is not a valid cron expression: {}",
                expr
            );
        }
        Ok(())
    }
}
