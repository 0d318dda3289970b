//! The most recently completed snapshot
//!
//! Writes replace the whole snapshot at once, so a reader sees either the previous or
//! the new cycle and never a mix of both.

use std::sync::Arc;

use tokio::sync::watch;

use crate::CombinedSnapshot;

/// Written by the scheduler only.
#[derive(Debug)]
pub struct LatestSnapshot {
    tx: watch::Sender<Option<Arc<CombinedSnapshot>>>,
}

/// Cheap, cloneable read access for the query side.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Option<Arc<CombinedSnapshot>>>,
}

impl Default for LatestSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl LatestSnapshot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn store(&self, snapshot: Arc<CombinedSnapshot>) {
        self.tx.send_replace(Some(snapshot));
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl SnapshotReader {
    /// `None` until the first cycle has completed.
    pub fn get(&self) -> Option<Arc<CombinedSnapshot>> {
        self.rx.borrow().clone()
    }
}
