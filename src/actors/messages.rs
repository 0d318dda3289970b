//! Messages exchanged with the scheduler actor

use std::{fmt, sync::Arc, time::Duration};

use tokio::sync::oneshot;

use crate::CombinedSnapshot;

/// Commands that can be sent to the scheduler
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run one cycle right away and respond with its snapshot
    ///
    /// Fails if a timer-driven cycle is still running.
    CollectNow {
        respond_to: oneshot::Sender<anyhow::Result<Arc<CombinedSnapshot>>>,
    },

    /// Change the time between two cycles
    UpdateInterval { interval: Duration },

    /// Stop the timer, abandon the running cycle and disconnect all subscribers
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Part of a snapshot produced by one sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    System,
    Containers,
    Services,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::System => write!(f, "system"),
            Section::Containers => write!(f, "containers"),
            Section::Services => write!(f, "services"),
        }
    }
}

/// What happened during one collection cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub elapsed: Duration,

    /// Sections that missed the cycle deadline and were reported empty
    pub timed_out: Vec<Section>,

    pub alerts: usize,
    pub critical: usize,
}

impl CycleReport {
    pub fn is_partial(&self) -> bool {
        !self.timed_out.is_empty()
    }
}
