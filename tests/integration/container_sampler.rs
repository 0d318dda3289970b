//! Integration tests for container sampling through a scripted runtime
//!
//! These tests verify that:
//! - Every listed container appears exactly once, with or without stats
//! - A hanging stats call is bounded and does not hold up the other containers

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use metrics_beacon::{
    ContainerState,
    error::{ProbeError, ProbeResult},
    monitors::containers::{ContainerEntry, ContainerRuntime, ContainerSampler, ContainerStats},
};
use pretty_assertions::assert_eq;

enum StatsBehaviour {
    Ok(ContainerStats),
    Fail,
    Hang,
}

struct ScriptedRuntime {
    entries: Vec<ContainerEntry>,
    stats: HashMap<String, StatsBehaviour>,
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn list_containers(&self) -> ProbeResult<Vec<ContainerEntry>> {
        Ok(self.entries.clone())
    }

    async fn container_stats(&self, id: &str) -> ProbeResult<ContainerStats> {
        match self.stats.get(id) {
            Some(StatsBehaviour::Ok(stats)) => Ok(stats.clone()),
            Some(StatsBehaviour::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(ProbeError::Failure("unreachable".to_string()))
            }
            Some(StatsBehaviour::Fail) | None => {
                Err(ProbeError::Failure(format!("Error response from daemon: {id}")))
            }
        }
    }
}

fn entry(index: usize, state: ContainerState) -> ContainerEntry {
    ContainerEntry {
        id: format!("{index:064x}"),
        name: format!("container-{index}"),
        status: state.to_string(),
        state,
    }
}

#[tokio::test]
async fn test_every_container_appears_once() {
    let states = [
        ContainerState::Running,
        ContainerState::Exited,
        ContainerState::Dead,
        ContainerState::Paused,
        ContainerState::Restarting,
        ContainerState::Created,
    ];
    let entries: Vec<_> = (0..12).map(|i| entry(i, states[i % states.len()])).collect();

    // only every third container has stats
    let stats = entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let behaviour = if i % 3 == 0 {
                StatsBehaviour::Ok(ContainerStats {
                    cpu_percent: i as f64,
                    memory_percent: 50.0,
                    ..Default::default()
                })
            } else {
                StatsBehaviour::Fail
            };
            (e.id.clone(), behaviour)
        })
        .collect();

    let runtime = ScriptedRuntime {
        entries: entries.clone(),
        stats,
    };
    let sampler = ContainerSampler::new(Arc::new(runtime), Duration::from_secs(1));

    let containers = sampler.sample().await;

    assert_eq!(containers.len(), entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let snapshot = &containers[&entry.name];
        assert_eq!(snapshot.state, entry.state);
        assert_eq!(snapshot.id.len(), 12);
        if i % 3 == 0 {
            assert_eq!(snapshot.memory.percent, 50.0);
        } else {
            assert_eq!(snapshot.cpu, 0.0);
            assert_eq!(snapshot.memory.percent, 0.0);
        }
    }
}

#[tokio::test]
async fn test_hanging_stats_are_bounded() {
    let entries = vec![
        entry(1, ContainerState::Running),
        entry(2, ContainerState::Running),
    ];
    let stats = HashMap::from([
        (entries[0].id.clone(), StatsBehaviour::Hang),
        (
            entries[1].id.clone(),
            StatsBehaviour::Ok(ContainerStats {
                cpu_percent: 12.5,
                memory_usage: "100MiB / 1GiB".to_string(),
                memory_percent: 9.8,
                network_io: "1kB / 1kB".to_string(),
                block_io: "0B / 0B".to_string(),
            }),
        ),
    ]);
    let runtime = ScriptedRuntime { entries, stats };
    let sampler = ContainerSampler::new(Arc::new(runtime), Duration::from_millis(200));

    let started = Instant::now();
    let containers = sampler.sample().await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(containers["container-1"].state, ContainerState::Running);
    assert_eq!(containers["container-1"].cpu, 0.0);
    assert_eq!(containers["container-2"].cpu, 12.5);
    assert_eq!(containers["container-2"].memory.usage, "100MiB / 1GiB");
}
