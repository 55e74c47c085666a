//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::failure::FailurePolicies;

/// Configuration for the interception pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Upper bound on one sync-to-async bridge call, in milliseconds.
    #[serde(default = "default_bridge_timeout")]
    pub bridge_timeout_ms: u64,

    /// Reported as `system.environment`.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Reported as `system.version`.
    #[serde(default = "default_system_version")]
    pub system_version: String,

    /// Reported as `system.is_maintenance`.
    #[serde(default)]
    pub maintenance_mode: bool,

    /// `meta.source` stamped on every outbox payload.
    #[serde(default = "default_event_source")]
    pub event_source: String,

    /// How long config values are cached by the `config` provider.
    #[serde(default = "default_config_ttl")]
    pub config_cache_ttl_secs: u64,

    #[serde(default)]
    pub failure_policies: FailurePolicies,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            bridge_timeout_ms: default_bridge_timeout(),
            environment: default_environment(),
            system_version: default_system_version(),
            maintenance_mode: false,
            event_source: default_event_source(),
            config_cache_ttl_secs: default_config_ttl(),
            failure_policies: FailurePolicies::default(),
        }
    }
}

impl GateConfig {
    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_timeout_ms)
    }

    pub fn config_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config_cache_ttl_secs)
    }
}

fn default_bridge_timeout() -> u64 {
    30_000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_system_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_event_source() -> String {
    "warden-kernel".to_string()
}

fn default_config_ttl() -> u64 {
    60
}
