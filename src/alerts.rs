//! Alert engine - derives threshold alerts from a combined snapshot
//!
//! [`evaluate`] is a pure function: the same snapshot and thresholds always give the
//! same alerts in the same order. Alerts are grouped by category (system, then
//! containers, then services) and are not sorted by severity. Containers and services
//! are visited in name order.

use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

use crate::{
    CombinedSnapshot, ContainerMap, ServiceMap, ServiceStatus, SystemSnapshot, config::Thresholds,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    System,
    Container,
    Service,
    Performance,
}

/// A derived fact about one snapshot. Replaced wholesale every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    /// Container or service the alert is about
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl Alert {
    pub fn new(severity: Severity, category: Category, message: impl ToString) -> Self {
        Self {
            severity,
            category,
            message: message.to_string(),
            subject: None,
            value: None,
            threshold: None,
            error: None,
        }
    }

    pub fn subject(mut self, subject: impl ToString) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn measured(mut self, value: f64, threshold: f64) -> Self {
        self.value = Some(value);
        self.threshold = Some(threshold);
        self
    }

    pub fn error(mut self, error: Option<&str>) -> Self {
        self.error = error.map(str::to_string);
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Evaluate every rule against `snapshot`. Any alerts already on the snapshot are ignored.
#[instrument(skip_all)]
pub fn evaluate(snapshot: &CombinedSnapshot, thresholds: &Thresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();

    system_alerts(&snapshot.system, thresholds, &mut alerts);
    container_alerts(&snapshot.containers, thresholds, &mut alerts);
    service_alerts(&snapshot.services, thresholds, &mut alerts);

    trace!("derived {} alerts", alerts.len());
    alerts
}

fn system_alerts(system: &SystemSnapshot, thresholds: &Thresholds, alerts: &mut Vec<Alert>) {
    let cpu = system.cpu.usage;
    if cpu > thresholds.cpu {
        alerts.push(
            Alert::new(
                Severity::Warning,
                Category::System,
                format!("High CPU usage: {cpu:.1}%"),
            )
            .measured(cpu, thresholds.cpu),
        );
    }

    let memory = system.memory.percent;
    if memory > thresholds.memory {
        alerts.push(
            Alert::new(
                Severity::Warning,
                Category::System,
                format!("High memory usage: {memory:.1}%"),
            )
            .measured(memory, thresholds.memory),
        );
    }

    let disk = f64::from(system.disk.percent);
    if disk > thresholds.disk {
        alerts.push(
            Alert::new(
                Severity::Critical,
                Category::System,
                format!("Critical disk usage: {}%", system.disk.percent),
            )
            .measured(disk, thresholds.disk),
        );
    }
}

fn container_alerts(containers: &ContainerMap, thresholds: &Thresholds, alerts: &mut Vec<Alert>) {
    for (name, container) in containers {
        if container.state.is_down() {
            alerts.push(
                Alert::new(
                    Severity::Critical,
                    Category::Container,
                    format!("Container {name} is not running ({})", container.state),
                )
                .subject(name),
            );
        }

        let memory = container.memory.percent;
        if memory > thresholds.container_memory {
            alerts.push(
                Alert::new(
                    Severity::Warning,
                    Category::Container,
                    format!("Container {name} high memory: {memory:.1}%"),
                )
                .subject(name)
                .measured(memory, thresholds.container_memory),
            );
        }

        if let Some(limit) = thresholds.container_cpu
            && container.cpu > limit
        {
            alerts.push(
                Alert::new(
                    Severity::Warning,
                    Category::Container,
                    format!("Container {name} high CPU: {:.1}%", container.cpu),
                )
                .subject(name)
                .measured(container.cpu, limit),
            );
        }
    }
}

fn service_alerts(services: &ServiceMap, thresholds: &Thresholds, alerts: &mut Vec<Alert>) {
    for (name, service) in services {
        if service.status == ServiceStatus::Unhealthy {
            let alert = if service.critical {
                Alert::new(
                    Severity::Critical,
                    Category::Service,
                    format!("Critical service {name} is down"),
                )
            } else {
                Alert::new(
                    Severity::Warning,
                    Category::Service,
                    format!("Service {name} is not responding"),
                )
            };
            alerts.push(alert.subject(name).error(service.error.as_deref()));
        }

        // independent of health: a slow but healthy service still alerts
        if let Some(response_time) = service.response_time
            && response_time > thresholds.response_time_ms
        {
            alerts.push(
                Alert::new(
                    Severity::Warning,
                    Category::Performance,
                    format!("Service {name} slow response: {response_time}ms"),
                )
                .subject(name)
                .measured(response_time as f64, thresholds.response_time_ms as f64),
            );
        }
    }
}
