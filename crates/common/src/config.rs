//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Account lifecycle configuration.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Maintenance worker configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Account lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Days between a deletion request and the point it may be finalized.
    #[serde(default = "default_deletion_grace_days")]
    pub deletion_grace_days: i64,
    /// Groups a non-premium account may own.
    #[serde(default = "default_free_tier_group_limit")]
    pub free_tier_group_limit: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            deletion_grace_days: default_deletion_grace_days(),
            free_tier_group_limit: default_free_tier_group_limit(),
        }
    }
}

/// Maintenance worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Seconds between lifecycle sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Accounts finalized per sweep page.
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: u64,
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_batch_size: default_sweep_batch_size(),
            json_logs: false,
        }
    }
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_deletion_grace_days() -> i64 {
    30
}

const fn default_free_tier_group_limit() -> u64 {
    1
}

const fn default_sweep_interval_secs() -> u64 {
    3600
}

const fn default_sweep_batch_size() -> u64 {
    100
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `WATCHLOG_ENV`)
    /// 4. Environment variables with `WATCHLOG_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("WATCHLOG_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("WATCHLOG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("WATCHLOG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
