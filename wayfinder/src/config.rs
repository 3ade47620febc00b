//! Discovery client configuration

use crate::error::{DiscoveryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default session length before the transport is recreated (30 minutes)
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 30 * 60 * 1000;

/// Main client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Region this client runs in
    #[serde(default = "default_region")]
    pub region: String,

    /// Ordered availability zones per region
    #[serde(default)]
    pub availability_zones: HashMap<String, Vec<String>>,

    /// Static discovery server URLs per zone (bootstrap list)
    #[serde(default)]
    pub service_urls: HashMap<String, Vec<String>>,

    /// Application name under which the read cluster registers itself
    #[serde(default = "default_read_cluster_app_name")]
    pub read_cluster_app_name: String,

    /// Context path appended to instance addresses when building service URLs
    #[serde(default = "default_service_context_path")]
    pub service_context_path: String,

    /// Period of the background endpoint refresh
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,

    /// Delay before the first scheduled refresh
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Nominal session length of the sessioned clients
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Fraction of the reconnect interval used as +/- jitter
    #[serde(default = "default_reconnect_jitter_ratio")]
    pub reconnect_jitter_ratio: f64,

    /// Order same-zone endpoints first
    #[serde(default = "default_zone_affinity")]
    pub zone_affinity: bool,

    /// Maximum age of the local registry cache before it is ignored
    #[serde(default = "default_registry_staleness")]
    pub registry_staleness_ms: u64,

    /// Share of candidates that may be quarantined before the quarantine resets
    #[serde(default = "default_quarantine_ratio")]
    pub quarantine_ratio: f64,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Identity of this process
    #[serde(default)]
    pub instance: InstanceConfig,
}

/// Identity of the local instance
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceConfig {
    /// Application name this instance registers under
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Unique instance identifier
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    /// Host name advertised to the registry
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// Port advertised to the registry
    #[serde(default = "default_instance_port")]
    pub port: u16,

    /// Zone this instance runs in; falls back to the first zone of the region
    pub zone: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_read_cluster_app_name() -> String {
    "DISCOVERY-READ".to_string()
}

fn default_service_context_path() -> String {
    "eureka/v2".to_string()
}

fn default_refresh_interval() -> u64 {
    5 * 60 * 1000
}

fn default_initial_delay() -> u64 {
    0
}

fn default_reconnect_interval() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}

fn default_reconnect_jitter_ratio() -> f64 {
    0.5
}

fn default_zone_affinity() -> bool {
    true
}

fn default_registry_staleness() -> u64 {
    5 * 60 * 1000
}

fn default_quarantine_ratio() -> f64 {
    0.66
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    8000
}

fn default_app_name() -> String {
    "UNKNOWN".to_string()
}

fn default_instance_id() -> String {
    format!("instance-{}", &uuid::Uuid::new_v4().to_string()[..8])
}

fn default_host_name() -> String {
    "localhost".to_string()
}

fn default_instance_port() -> u16 {
    8080
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            instance_id: default_instance_id(),
            host_name: default_host_name(),
            port: default_instance_port(),
            zone: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            availability_zones: HashMap::new(),
            service_urls: HashMap::new(),
            read_cluster_app_name: default_read_cluster_app_name(),
            service_context_path: default_service_context_path(),
            refresh_interval_ms: default_refresh_interval(),
            initial_delay_ms: default_initial_delay(),
            reconnect_interval_ms: default_reconnect_interval(),
            reconnect_jitter_ratio: default_reconnect_jitter_ratio(),
            zone_affinity: default_zone_affinity(),
            registry_staleness_ms: default_registry_staleness(),
            quarantine_ratio: default_quarantine_ratio(),
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            instance: InstanceConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load config from a TOML file, or fall back to defaults when it is missing
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            ClientConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_ms == 0 {
            return Err(DiscoveryError::Config(
                "refresh_interval_ms must be greater than zero".into(),
            ));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(DiscoveryError::Config(
                "reconnect_interval_ms must be greater than zero".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.reconnect_jitter_ratio) {
            return Err(DiscoveryError::Config(format!(
                "reconnect_jitter_ratio must be in [0, 1), got {}",
                self.reconnect_jitter_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.quarantine_ratio) {
            return Err(DiscoveryError::Config(format!(
                "quarantine_ratio must be in [0, 1], got {}",
                self.quarantine_ratio
            )));
        }
        Ok(())
    }

    /// Availability zones configured for a region
    pub fn zones_for(&self, region: &str) -> &[String] {
        self.availability_zones
            .get(region)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Zone of this instance: the configured one, else the first zone of the region
    pub fn my_zone(&self) -> String {
        self.instance
            .zone
            .clone()
            .or_else(|| self.zones_for(&self.region).first().cloned())
            .unwrap_or_else(|| "default".to_string())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn registry_staleness(&self) -> Duration {
        Duration::from_millis(self.registry_staleness_ms)
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
