//! Relay, worker and daemon configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Polling discipline shared by the relay and the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Delay between polls, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Rows per relay batch.
    #[serde(default = "default_relay_batch")]
    pub relay_batch_size: usize,

    /// Rows per worker batch.
    #[serde(default = "default_worker_batch")]
    pub worker_batch_size: usize,

    /// Messages go to `<prefix>.events`.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Pause after a failed batch, in seconds.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            relay_batch_size: default_relay_batch(),
            worker_batch_size: default_worker_batch(),
            topic_prefix: default_topic_prefix(),
            error_backoff_secs: default_error_backoff(),
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn topic(&self) -> String {
        format!("{}.events", self.topic_prefix)
    }
}

/// Storage backend for the daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (development only; nothing is shared with writers)
    #[default]
    Memory,

    /// SQLite database shared with the writing application
    Sqlite {
        url: String,

        #[serde(default = "default_pool_size")]
        max_connections: u32,

        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Destination for relayed messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    /// Log every message
    #[default]
    Log,

    /// POST every message to an HTTP endpoint
    Webhook {
        url: String,

        #[serde(default = "default_webhook_timeout")]
        timeout_secs: u64,
    },
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DaemonConfig {
    /// Defaults, then the optional file, then `WARDEN_*` environment variables
    /// (`WARDEN_RELAY__TOPIC_PREFIX=acme`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("WARDEN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

fn default_poll_interval() -> u64 {
    2_000
}

fn default_relay_batch() -> usize {
    100
}

fn default_worker_batch() -> usize {
    10
}

fn default_topic_prefix() -> String {
    "warden".to_string()
}

fn default_error_backoff() -> u64 {
    5
}

fn default_pool_size() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_webhook_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}
