use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::util;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seconds between two collection cycles
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Seconds a cycle may take before it completes with partial data
    /// (defaults to twice the interval)
    pub cycle_timeout: Option<u64>,

    /// Seconds a single host or container runtime command may take
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    /// Where critical alerts are delivered (optional)
    pub notifier: Option<Notifier>,

    #[serde(default = "crate::util::get_default_addr")]
    pub addr: IpAddr,

    #[serde(default = "crate::util::get_default_push_port")]
    pub push_port: u16,

    #[serde(default = "crate::util::get_default_query_port")]
    pub query_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            cycle_timeout: None,
            command_timeout: default_command_timeout(),
            thresholds: Thresholds::default(),
            services: Vec::new(),
            notifier: None,
            addr: util::get_default_addr(),
            push_port: util::get_default_push_port(),
            query_port: util::get_default_query_port(),
        }
    }
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }

    pub fn cycle_timeout(&self) -> Duration {
        self.cycle_timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.interval() * 2)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }

    pub fn push_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.push_port)
    }

    pub fn query_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.query_port)
    }

    /// Apply `BEACON_*` environment overrides on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(interval) = util::get_interval() {
            self.interval = interval;
        }
        if let Some(addr) = util::get_addr() {
            self.addr = addr;
        }
        if let Some(port) = util::get_push_port() {
            self.push_port = port;
        }
        if let Some(port) = util::get_query_port() {
            self.query_port = port;
        }
        if let Some(cpu) = util::get_cpu_threshold() {
            self.thresholds.cpu = cpu;
        }
        if let Some(memory) = util::get_memory_threshold() {
            self.thresholds.memory = memory;
        }
        if let Some(disk) = util::get_disk_threshold() {
            self.thresholds.disk = disk;
        }
        if let Some(url) = util::get_notify_url() {
            self.notifier = Some(Notifier::Push(Push { url }));
        }
        self
    }
}

/// Limits the alert engine compares every snapshot against
///
/// Read from the config file in snake_case, served over the query API in camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct Thresholds {
    /// Host CPU usage percent (warning)
    pub cpu: f64,
    /// Host memory usage percent (warning)
    pub memory: f64,
    /// Root filesystem usage percent (critical)
    pub disk: f64,
    /// Per-container memory percent (warning)
    pub container_memory: f64,
    /// Service response time in milliseconds (warning)
    pub response_time_ms: u64,
    /// Per-container CPU percent (warning, off unless set)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_cpu: Option<f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: 80.0,
            memory: 85.0,
            disk: 90.0,
            container_memory: 80.0,
            response_time_ms: 3000,
            container_cpu: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,

    /// An unhealthy critical service raises a critical alert instead of a warning
    #[serde(default)]
    pub critical: bool,

    #[serde(flatten)]
    pub probe: Probe,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "probe", rename_all = "lowercase")]
pub enum Probe {
    /// Reachability check, healthy on any non-error response
    Http(HttpProbe),

    /// Readiness command, healthy on exit code zero
    Command(CommandProbe),
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpProbe {
    pub url: String,

    #[serde(default)]
    pub method: HttpMethod,

    /// Accepted status codes (default: anything below 400)
    pub expected_status: Option<Vec<u16>>,

    /// Regex the response body must match
    pub body_pattern: Option<String>,

    /// Timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandProbe {
    pub command: String,

    /// Timeout in seconds (default: the command timeout)
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notifier {
    /// JSON `{ title, body }` POSTed to a push-delivery endpoint
    Push(Push),
    Discord(Discord),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Push {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

fn default_interval() -> u64 {
    5
}

fn default_command_timeout() -> u64 {
    10
}

fn default_http_timeout() -> u64 {
    5
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided! ({e})"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
