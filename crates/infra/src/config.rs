//! Configuration loading and representation.
//!
//! Layered, lowest precedence first:
//! 1. Default values in code
//! 2. `config/<environment>.toml` (optional)
//! 3. Environment variables with the `SLABLEDGER_` prefix and `__` as the
//!    section separator, e.g. `SLABLEDGER_DATABASE__URL`
//!
//! A `.env` file in the working directory is loaded into the process
//! environment first.

use config::{ConfigError, Environment, File};
use serde::Deserialize;

pub use slabledger_observability::{LogFormat, ObservabilityConfig};

const ENV_PREFIX: &str = "SLABLEDGER";

/// Settings of a process embedding the stock ledger.
#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Current environment (development, production)
    pub environment: String,

    pub database: DatabaseConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection before failing
    pub acquire_timeout_secs: u64,
}

impl LedgerConfig {
    /// Load configuration from `.env`, files and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let environment =
            std::env::var("SLABLEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());
        Self::load_from(&environment, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_from(environment: &str, env: Environment) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .set_default("environment", environment)?
            .set_default("database.url", "postgres://localhost/slabledger")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("observability.log_filter", "info")?
            .set_default("observability.log_format", "json")?
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(env.prefix_separator("_").separator("__").try_parsing(true))
            .build()?;

        config.try_deserialize()
    }
}
