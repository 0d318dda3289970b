pub mod actors;
pub mod alerts;
pub mod api;
pub mod broadcast;
pub mod config;
pub mod discord;
pub mod error;
pub mod executor;
pub mod latest;
pub mod monitors;
pub mod notifier;
pub mod util;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::alerts::Alert;

/// Containers of one cycle, keyed by container name.
pub type ContainerMap = BTreeMap<String, ContainerSnapshot>;

/// Services of one cycle, keyed by the configured service name.
pub type ServiceMap = BTreeMap<String, ServiceSnapshot>;

/// Host-wide resource usage at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    pub disk: DiskUsage,
    /// 1, 5 and 15 minute load averages.
    pub load: [f64; 3],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuUsage {
    /// Can exceed 100 briefly because of sampling jitter. Alerting uses the raw value.
    pub usage: f64,
    pub cores: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Used memory in MB, computed as `total - available`.
    pub used: u64,
    /// Total memory in MB.
    pub total: u64,
    pub percent: f64,
}

impl MemoryUsage {
    /// Build the memory reading from total and available bytes.
    ///
    /// Available (not free) memory is subtracted so reclaimable cache and buffers
    /// do not count as used.
    pub fn from_bytes(total_bytes: u64, available_bytes: u64) -> Self {
        const MB: u64 = 1024 * 1024;

        let used_bytes = total_bytes.saturating_sub(available_bytes);
        Self::from_mb(used_bytes / MB, total_bytes / MB)
    }

    pub fn from_mb(used: u64, total: u64) -> Self {
        let percent = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            used,
            total,
            percent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    /// Human readable, e.g. `120G`.
    pub used: String,
    pub total: String,
    pub percent: u8,
}

impl DiskUsage {
    pub fn from_bytes(total_bytes: u64, available_bytes: u64) -> Self {
        if total_bytes == 0 {
            return Self::default();
        }

        let used_bytes = total_bytes.saturating_sub(available_bytes);
        let percent = (used_bytes as f64 / total_bytes as f64 * 100.0).round() as u8;

        Self {
            used: util::format_bytes(used_bytes),
            total: util::format_bytes(total_bytes),
            percent,
        }
    }
}

/// Lifecycle state reported by the container runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Exited,
    Dead,
    Restarting,
    Paused,
    Created,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Running => "running",
            ContainerState::Exited => "exited",
            ContainerState::Dead => "dead",
            ContainerState::Restarting => "restarting",
            ContainerState::Paused => "paused",
            ContainerState::Created => "created",
            ContainerState::Unknown => "unknown",
        }
    }

    /// A container in this state is not going to come back on its own.
    pub fn is_down(&self) -> bool {
        matches!(self, ContainerState::Exited | ContainerState::Dead)
    }
}

impl From<&str> for ContainerState {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "running" => ContainerState::Running,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            "restarting" => ContainerState::Restarting,
            "paused" => ContainerState::Paused,
            "created" => ContainerState::Created,
            _ => ContainerState::Unknown,
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One container's state at one instant.
///
/// The name is the key of the surrounding [`ContainerMap`] and is not repeated here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    /// Short (12 character) container id.
    pub id: String,
    pub cpu: f64,
    pub memory: ContainerMemory,
    pub network: String,
    pub disk: String,
    pub status: String,
    pub state: ContainerState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerMemory {
    pub usage: String,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceStatus::Healthy => write!(f, "healthy"),
            ServiceStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// One external dependency's health at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    pub status: ServiceStatus,
    /// Only present for HTTP probes that succeeded.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response_time: Option<u64>,
    pub critical: bool,
    /// Only present when unhealthy.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl ServiceSnapshot {
    pub fn healthy(critical: bool, response_time: Option<u64>) -> Self {
        Self {
            status: ServiceStatus::Healthy,
            response_time,
            critical,
            error: None,
        }
    }

    pub fn unhealthy(critical: bool, error: impl ToString) -> Self {
        Self {
            status: ServiceStatus::Unhealthy,
            response_time: None,
            critical,
            error: Some(error.to_string()),
        }
    }
}

/// The unit of broadcast and of query responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedSnapshot {
    /// Epoch milliseconds at which the cycle completed.
    pub timestamp: i64,
    pub system: SystemSnapshot,
    pub containers: ContainerMap,
    pub services: ServiceMap,
    pub alerts: Vec<Alert>,
}

impl CombinedSnapshot {
    pub fn critical_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|alert| alert.is_critical())
    }
}

/// Envelope pushed to every subscriber of the live feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum MetricsMessage {
    Metrics(CombinedSnapshot),
}
