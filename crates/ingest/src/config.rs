use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";
pub const DEFAULT_TABLE: &str = "ticks";

/// Immutable pipeline configuration shared by the connector and the writer.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Rows per flush before the interval elapses
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum age of a batch before it is flushed
    #[serde(default = "default_flush_interval_seconds")]
    pub flush_interval_seconds: f64,
    /// Retries after the first failed flush attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Capacity of the connector -> writer queue
    #[serde(default = "default_queue_max_size")]
    pub queue_max_size: usize,
    /// Product ids to subscribe to (e.g. "BTC-USD")
    #[serde(alias = "symbol_list")]
    pub symbols: Vec<String>,
    #[serde(default = "default_ping_interval_seconds")]
    pub ping_interval_seconds: u64,
    #[serde(default = "default_max_backoff_seconds")]
    pub max_backoff_seconds: u64,
    /// Session is considered dead after this long without a frame
    #[serde(default = "default_read_timeout_seconds")]
    pub read_timeout_seconds: u64,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Target table for tick rows
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_batch_size() -> usize {
    500
}

fn default_flush_interval_seconds() -> f64 {
    1.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_queue_max_size() -> usize {
    10_000
}

fn default_ping_interval_seconds() -> u64 {
    20
}

fn default_max_backoff_seconds() -> u64 {
    60
}

fn default_read_timeout_seconds() -> u64 {
    120
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

impl IngestConfig {
    /// Config with defaults for everything except the symbol list.
    pub fn new(symbols: Vec<String>) -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_seconds: default_flush_interval_seconds(),
            max_retries: default_max_retries(),
            queue_max_size: default_queue_max_size(),
            symbols,
            ping_interval_seconds: default_ping_interval_seconds(),
            max_backoff_seconds: default_max_backoff_seconds(),
            read_timeout_seconds: default_read_timeout_seconds(),
            ws_url: default_ws_url(),
            table: default_table(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be greater than zero".into()));
        }
        if self.queue_max_size == 0 {
            return Err(ConfigError::Invalid(
                "queue_max_size must be greater than zero".into(),
            ));
        }
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("symbols must not be empty".into()));
        }
        if !(self.flush_interval_seconds.is_finite() && self.flush_interval_seconds > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "flush_interval_seconds must be positive, got {}",
                self.flush_interval_seconds
            )));
        }
        if self.ping_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "ping_interval_seconds must be greater than zero".into(),
            ));
        }
        if self.max_backoff_seconds == 0 {
            return Err(ConfigError::Invalid(
                "max_backoff_seconds must be at least 1".into(),
            ));
        }
        if self.table.is_empty()
            || !self
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::Invalid(format!("invalid table name: {:?}", self.table)));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs_f64(self.flush_interval_seconds)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_seconds)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }
}
