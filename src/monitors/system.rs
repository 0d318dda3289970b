use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use sysinfo::{Disks, System};
use tracing::{debug, error, instrument, trace};

use crate::{CpuUsage, DiskUsage, MemoryUsage, SystemSnapshot, monitors::Sampler};

/// Samples host CPU, memory, root disk and load average.
///
/// CPU usage is the delta between two refreshes, so the sampler keeps its [`System`]
/// around between cycles. Only the very first sample has to wait for a second refresh.
pub struct SystemSampler {
    host: Arc<Mutex<HostState>>,
    mount_point: PathBuf,
}

struct HostState {
    system: System,
    primed: bool,
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler {
    pub fn new() -> Self {
        Self::with_mount_point("/")
    }

    /// Report disk usage for the filesystem mounted at `mount_point` instead of `/`.
    pub fn with_mount_point(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            host: Arc::new(Mutex::new(HostState {
                system: System::new(),
                primed: false,
            })),
            mount_point: mount_point.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn sample(&self) -> SystemSnapshot {
        let host = self.host.clone();
        let mount_point = self.mount_point.clone();

        match tokio::task::spawn_blocking(move || read_host(&host, &mount_point)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("system sampling task failed: {e}");
                SystemSnapshot::default()
            }
        }
    }
}

#[async_trait]
impl Sampler for SystemSampler {
    type Output = SystemSnapshot;

    async fn sample(&self) -> SystemSnapshot {
        SystemSampler::sample(self).await
    }
}

fn read_host(host: &Mutex<HostState>, mount_point: &Path) -> SystemSnapshot {
    let mut host = host.lock().unwrap_or_else(PoisonError::into_inner);

    if !host.primed {
        host.system.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        host.primed = true;
    }

    let system = &mut host.system;
    system.refresh_cpu_usage();
    system.refresh_memory();

    let cores = match system.cpus().len() {
        0 => std::thread::available_parallelism().map_or(0, |n| n.get()),
        n => n,
    };
    let cpu = CpuUsage {
        usage: system.global_cpu_usage() as f64,
        cores,
    };

    let memory = MemoryUsage::from_bytes(system.total_memory(), system.available_memory());

    let load = System::load_average();
    let snapshot = SystemSnapshot {
        cpu,
        memory,
        disk: read_disk(mount_point),
        load: [load.one, load.five, load.fifteen],
    };

    trace!("host snapshot: {snapshot:?}");
    snapshot
}

fn read_disk(mount_point: &Path) -> DiskUsage {
    let disks = Disks::new_with_refreshed_list();

    let disk = disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == mount_point)
        .or_else(|| disks.list().first());

    match disk {
        Some(disk) => DiskUsage::from_bytes(disk.total_space(), disk.available_space()),
        None => {
            debug!("no disk found for {}", mount_point.display());
            DiskUsage::default()
        }
    }
}
