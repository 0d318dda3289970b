//! Actors driving the collection pipeline
//!
//! ```text
//! Timer tick / CollectNow
//!     │
//!     ▼
//! SchedulerActor ──▶ system + containers + services (concurrent, one deadline)
//!     │
//!     ▼
//! evaluate alerts ──▶ LatestSnapshot ──▶ query server
//!     │
//!     ├─────────────▶ BroadcastHub ──▶ push subscribers
//!     └─ critical? ─▶ CriticalNotifier (detached)
//! ```
//!
//! The actor owns its state and is controlled through a cloneable
//! [`SchedulerHandle`](scheduler::SchedulerHandle) sending [`SchedulerCommand`]s over an
//! mpsc channel. Request/response commands carry a oneshot sender.

pub mod messages;
pub mod scheduler;

pub use messages::{CycleReport, SchedulerCommand, Section};
pub use scheduler::{SchedulerHandle, SchedulerSettings, run_cycle};
