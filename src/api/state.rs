//! State shared by the push and query handlers

use std::{sync::Arc, time::Instant};

use crate::{broadcast::BroadcastHub, config::Thresholds, latest::SnapshotReader};

#[derive(Debug, Clone)]
pub struct ApiState {
    pub reader: SnapshotReader,
    pub hub: BroadcastHub,
    pub thresholds: Arc<Thresholds>,
    started: Instant,
}

impl ApiState {
    pub fn new(reader: SnapshotReader, hub: BroadcastHub, thresholds: Thresholds) -> Self {
        Self {
            reader,
            hub,
            thresholds: Arc::new(thresholds),
            started: Instant::now(),
        }
    }

    /// Seconds since the state was created
    pub fn uptime(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
