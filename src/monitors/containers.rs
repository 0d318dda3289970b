//! Container sampling
//!
//! Sampling is two-phase. The listing establishes the authoritative set of names and
//! lifecycle states, stats are then fetched per container. A failed stats call never
//! removes a container from the result, it only leaves its resource fields zeroed.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{ListContainersOptions, Stats, StatsOptions},
    models::ContainerSummary,
};
use futures::{StreamExt, TryStreamExt, future::join_all};
use tracing::{debug, instrument, trace, warn};

use crate::{
    ContainerMap, ContainerMemory, ContainerSnapshot, ContainerState,
    error::{ProbeError, ProbeResult},
    monitors::Sampler,
    util,
};

const SHORT_ID_LEN: usize = 12;

/// A container as the runtime lists it, running or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerEntry {
    pub id: String,
    pub name: String,
    /// Human readable status, e.g. `Up 2 hours` or `Exited (1) 3 minutes ago`
    pub status: String,
    pub state: ContainerState,
}

/// Live resource usage of a single container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_usage: String,
    pub memory_percent: f64,
    pub network_io: String,
    pub block_io: String,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Every container known to the runtime, including stopped ones.
    async fn list_containers(&self) -> ProbeResult<Vec<ContainerEntry>>;

    async fn container_stats(&self, id: &str) -> ProbeResult<ContainerStats>;
}

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect through `DOCKER_HOST` or the local socket, bounding every API call.
    pub fn connect(timeout: Duration) -> ProbeResult<Self> {
        let docker = Docker::connect_with_local_defaults()?.with_timeout(timeout);
        Ok(Self::new(docker))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> ProbeResult<Vec<ContainerEntry>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;

        Ok(entries_from_summaries(summaries))
    }

    async fn container_stats(&self, id: &str) -> ProbeResult<ContainerStats> {
        // one_shot=false lets the daemon fill in the previous cpu sample
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };
        let stats: Vec<Stats> = self
            .docker
            .stats(id, Some(options))
            .take(1)
            .try_collect()
            .await?;

        let stats = stats
            .first()
            .ok_or_else(|| ProbeError::Parse(format!("no stats reported for {id}")))?;

        Ok(UsageCounters::from(stats).into_stats())
    }
}

/// Keep every listed container that has an id and a name, skipping the rest.
fn entries_from_summaries(summaries: Vec<ContainerSummary>) -> Vec<ContainerEntry> {
    summaries
        .into_iter()
        .filter_map(|summary| match entry_from_summary(summary) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping container: {e}");
                None
            }
        })
        .collect()
}

fn entry_from_summary(summary: ContainerSummary) -> ProbeResult<ContainerEntry> {
    let id = summary
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProbeError::Parse("container without an id".to_string()))?;

    // the engine reports names with a leading slash, links as `/app/db`
    let name = summary
        .names
        .unwrap_or_default()
        .into_iter()
        .map(|name| name.trim_start_matches('/').to_string())
        .find(|name| !name.is_empty() && !name.contains('/'))
        .ok_or_else(|| ProbeError::Parse(format!("container {id} has no name")))?;

    Ok(ContainerEntry {
        id,
        name,
        state: ContainerState::from(summary.state.as_deref().unwrap_or_default()),
        status: summary.status.unwrap_or_default(),
    })
}

/// Raw counters of one stats reading.
#[derive(Debug, Clone, Default, PartialEq)]
struct UsageCounters {
    cpu_total: u64,
    precpu_total: u64,
    system_total: u64,
    presystem_total: u64,
    online_cpus: u64,
    memory_usage: u64,
    memory_limit: u64,
    network_rx: u64,
    network_tx: u64,
    block_read: u64,
    block_write: u64,
}

impl From<&Stats> for UsageCounters {
    fn from(stats: &Stats) -> Self {
        let online_cpus = stats.cpu_stats.online_cpus.unwrap_or_else(|| {
            stats
                .cpu_stats
                .cpu_usage
                .percpu_usage
                .as_ref()
                .map_or(1, |cpus| cpus.len() as u64)
        });

        let (network_rx, network_tx) = stats
            .networks
            .iter()
            .flat_map(|networks| networks.values())
            .fold((0, 0), |(rx, tx), net| (rx + net.rx_bytes, tx + net.tx_bytes));

        let (block_read, block_write) = stats
            .blkio_stats
            .io_service_bytes_recursive
            .iter()
            .flatten()
            .fold((0, 0), |(read, write), entry| {
                match entry.op.to_ascii_lowercase().as_str() {
                    "read" => (read + entry.value, write),
                    "write" => (read, write + entry.value),
                    _ => (read, write),
                }
            });

        Self {
            cpu_total: stats.cpu_stats.cpu_usage.total_usage,
            precpu_total: stats.precpu_stats.cpu_usage.total_usage,
            system_total: stats.cpu_stats.system_cpu_usage.unwrap_or_default(),
            presystem_total: stats.precpu_stats.system_cpu_usage.unwrap_or_default(),
            online_cpus,
            memory_usage: stats.memory_stats.usage.unwrap_or_default(),
            memory_limit: stats.memory_stats.limit.unwrap_or_default(),
            network_rx,
            network_tx,
            block_read,
            block_write,
        }
    }
}

impl UsageCounters {
    /// CPU percent the way `docker stats` computes it, relative to one core.
    fn cpu_percent(&self) -> f64 {
        let cpu_delta = self.cpu_total.saturating_sub(self.precpu_total);
        let system_delta = self.system_total.saturating_sub(self.presystem_total);

        if cpu_delta == 0 || system_delta == 0 {
            return 0.0;
        }
        cpu_delta as f64 / system_delta as f64 * self.online_cpus.max(1) as f64 * 100.0
    }

    fn memory_percent(&self) -> f64 {
        if self.memory_limit == 0 {
            return 0.0;
        }
        self.memory_usage as f64 / self.memory_limit as f64 * 100.0
    }

    fn into_stats(self) -> ContainerStats {
        ContainerStats {
            cpu_percent: round2(self.cpu_percent()),
            memory_usage: io_pair(self.memory_usage, self.memory_limit),
            memory_percent: round2(self.memory_percent()),
            network_io: io_pair(self.network_rx, self.network_tx),
            block_io: io_pair(self.block_read, self.block_write),
        }
    }
}

fn io_pair(first: u64, second: u64) -> String {
    format!("{} / {}", util::format_bytes(first), util::format_bytes(second))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Samples every container of a [`ContainerRuntime`].
pub struct ContainerSampler {
    runtime: Arc<dyn ContainerRuntime>,
    stats_timeout: Duration,
}

impl ContainerSampler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, stats_timeout: Duration) -> Self {
        Self {
            runtime,
            stats_timeout,
        }
    }

    #[instrument(skip(self))]
    pub async fn sample(&self) -> ContainerMap {
        let entries = match self.runtime.list_containers().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("failed to list containers: {e}");
                return ContainerMap::new();
            }
        };
        trace!("runtime lists {} containers", entries.len());

        let stats = join_all(entries.iter().map(|entry| self.stats_for(entry))).await;

        entries
            .into_iter()
            .zip(stats)
            .map(|(entry, stats)| {
                let snapshot = build_snapshot(&entry, stats);
                (entry.name, snapshot)
            })
            .collect()
    }

    async fn stats_for(&self, entry: &ContainerEntry) -> Option<ContainerStats> {
        let stats = self.runtime.container_stats(&entry.id);

        match tokio::time::timeout(self.stats_timeout, stats).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                debug!("no stats for container {}: {e}", entry.name);
                None
            }
            Err(_) => {
                debug!(
                    "{}",
                    ProbeError::timeout(format!("stats of {}", entry.name), self.stats_timeout)
                );
                None
            }
        }
    }
}

#[async_trait]
impl Sampler for ContainerSampler {
    type Output = ContainerMap;

    async fn sample(&self) -> ContainerMap {
        ContainerSampler::sample(self).await
    }
}

fn build_snapshot(entry: &ContainerEntry, stats: Option<ContainerStats>) -> ContainerSnapshot {
    let stats = stats.unwrap_or_else(|| ContainerStats {
        memory_usage: "0B / 0B".to_string(),
        network_io: "0B / 0B".to_string(),
        block_io: "0B / 0B".to_string(),
        ..Default::default()
    });

    ContainerSnapshot {
        id: entry.id.chars().take(SHORT_ID_LEN).collect(),
        cpu: stats.cpu_percent,
        memory: ContainerMemory {
            usage: stats.memory_usage,
            percent: stats.memory_percent,
        },
        network: stats.network_io,
        disk: stats.block_io,
        status: entry.status.clone(),
        state: entry.state,
    }
}
