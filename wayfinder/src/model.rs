//! Registry data model exchanged with discovery servers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a registered instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Up,
    Down,
    Starting,
    OutOfService,
    #[default]
    Unknown,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Up => "UP",
            InstanceStatus::Down => "DOWN",
            InstanceStatus::Starting => "STARTING",
            InstanceStatus::OutOfService => "OUT_OF_SERVICE",
            InstanceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of change carried by an instance inside a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Added,
    Modified,
    Deleted,
}

/// One registered instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub instance_id: String,
    pub app: String,
    pub host_name: String,
    #[serde(default)]
    pub ip_addr: Option<String>,
    pub port: u16,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub status: InstanceStatus,
    /// Availability zone the instance runs in
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,
}

impl InstanceInfo {
    pub fn new(app: impl Into<String>, instance_id: impl Into<String>, host_name: impl Into<String>, port: u16) -> Self {
        Self {
            instance_id: instance_id.into(),
            app: app.into().to_uppercase(),
            host_name: host_name.into(),
            ip_addr: None,
            port,
            secure: false,
            status: InstanceStatus::Up,
            zone: None,
            action_type: None,
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_up(&self) -> bool {
        self.status == InstanceStatus::Up
    }
}

/// All instances of one application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub name: String,
    #[serde(default)]
    pub instances: Vec<InstanceInfo>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            instances: Vec::new(),
        }
    }

    pub fn with_instance(mut self, instance: InstanceInfo) -> Self {
        self.instances.push(instance);
        self
    }
}

/// Full registry or a delta of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Applications {
    #[serde(default)]
    pub version_delta: Option<i64>,
    #[serde(default)]
    pub apps_hash_code: Option<String>,
    #[serde(default)]
    pub applications: Vec<Application>,
}

impl Applications {
    pub fn new(applications: Vec<Application>) -> Self {
        Self {
            version_delta: None,
            apps_hash_code: None,
            applications,
        }
    }

    /// Find an application by name (case-insensitive)
    pub fn application(&self, name: &str) -> Option<&Application> {
        self.applications
            .iter()
            .find(|app| app.name.eq_ignore_ascii_case(name))
    }

    pub fn instance_count(&self) -> usize {
        self.applications.iter().map(|a| a.instances.len()).sum()
    }

    /// Hash in the `STATUS_count_` form used to reconcile deltas
    pub fn compute_hash_code(&self) -> String {
        let mut counts: std::collections::BTreeMap<&'static str, usize> = Default::default();
        for instance in self.applications.iter().flat_map(|a| &a.instances) {
            *counts.entry(instance.status.as_str()).or_default() += 1;
        }
        counts
            .iter()
            .map(|(status, count)| format!("{}_{}_", status, count))
            .collect()
    }
}
