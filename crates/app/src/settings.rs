//! Runtime settings for the ledger runner.
//!
//! Read from an optional `settings.toml` in the working directory, then
//! overridden by `MONEDERO__*` environment variables, e.g.
//! `MONEDERO__APP__LEVEL=debug` or `MONEDERO__WORKERS__BATCH_SIZE=100`.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
    /// Any connection string sea-orm understands.
    Url(String),
}

impl Default for Database {
    fn default() -> Self {
        Self::Sqlite("monedero.db".to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Periodic jobs. An interval of `0` disables the job.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Workers {
    pub scheduled_transfers_secs: u64,
    pub recharges_secs: u64,
    pub hold_sweep_secs: u64,
    pub outbox_secs: u64,
    /// Rows picked up per tick.
    pub batch_size: u64,
    /// Attempts per row when the failure is a storage error.
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Agent settling async recharges; the oldest active agent when unset.
    pub recharge_agent: Option<Uuid>,
}

impl Default for Workers {
    fn default() -> Self {
        Self {
            scheduled_transfers_secs: 30,
            recharges_secs: 30,
            hold_sweep_secs: 300,
            outbox_secs: 10,
            batch_size: 50,
            retry_attempts: 3,
            retry_backoff_ms: 200,
            recharge_agent: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub workers: Workers,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::with_prefix("MONEDERO").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}
