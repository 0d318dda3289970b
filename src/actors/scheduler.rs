//! SchedulerActor - runs collection cycles on a fixed interval
//!
//! The actor is either idle or has exactly one cycle in flight. A tick that fires
//! while a cycle is still running is skipped, never queued, so cycles cannot pile up.
//! Each cycle is bounded by a deadline; samplers that miss it contribute an empty
//! section instead of stale data.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → sample (concurrently) → evaluate alerts → store latest → publish → notify
//!     ↑
//!     └─── Commands (CollectNow, UpdateInterval, Shutdown)
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Interval, MissedTickBehavior, error::Elapsed, interval, timeout_at},
};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    CombinedSnapshot, alerts,
    broadcast::BroadcastHub,
    config::{Config, Thresholds},
    latest::LatestSnapshot,
    monitors::Samplers,
    notifier::CriticalNotifier,
};

use super::messages::{CycleReport, SchedulerCommand, Section};

const MIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    /// Budget of a single cycle
    pub cycle_timeout: Duration,
    pub thresholds: Thresholds,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.interval(),
            cycle_timeout: config.cycle_timeout(),
            thresholds: config.thresholds.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct SchedulerStats {
    cycles_completed: AtomicU64,
    partial_cycles: AtomicU64,
    ticks_skipped: AtomicU64,
}

/// Everything a cycle needs, cloned into the task that runs it
#[derive(Clone)]
struct Pipeline {
    samplers: Samplers,
    thresholds: Thresholds,
    cycle_timeout: Duration,
    latest: Arc<LatestSnapshot>,
    hub: BroadcastHub,
    notifier: Option<CriticalNotifier>,
    stats: Arc<SchedulerStats>,
}

impl Pipeline {
    #[instrument(skip(self))]
    async fn run(&self) -> Arc<CombinedSnapshot> {
        let (snapshot, report) =
            run_cycle(&self.samplers, &self.thresholds, self.cycle_timeout).await;
        let snapshot = Arc::new(snapshot);

        self.latest.store(snapshot.clone());
        let broadcast = self.hub.publish(&snapshot);

        if report.critical > 0
            && let Some(notifier) = &self.notifier
        {
            let notifier = notifier.clone();
            let alerts = snapshot.alerts.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&alerts).await {
                    error!("failed to deliver critical alerts: {e}");
                }
            });
        }

        self.stats.cycles_completed.fetch_add(1, Ordering::Relaxed);
        if report.is_partial() {
            self.stats.partial_cycles.fetch_add(1, Ordering::Relaxed);
        }

        debug!(
            "cycle finished in {:?}: {} alerts ({} critical), sent to {} subscribers",
            report.elapsed, report.alerts, report.critical, broadcast.delivered
        );
        snapshot
    }
}

/// Run the three samplers concurrently under one deadline, then derive alerts.
///
/// A sampler that misses the deadline is abandoned and its section left empty. The
/// returned report lists those sections.
#[instrument(skip_all)]
pub async fn run_cycle(
    samplers: &Samplers,
    thresholds: &Thresholds,
    budget: Duration,
) -> (CombinedSnapshot, CycleReport) {
    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + budget;

    let (system, containers, services) = tokio::join!(
        timeout_at(deadline, samplers.system.sample()),
        timeout_at(deadline, samplers.containers.sample()),
        timeout_at(deadline, samplers.services.sample()),
    );

    let mut report = CycleReport::default();
    let mut snapshot = CombinedSnapshot {
        timestamp: 0,
        system: or_empty(system, Section::System, &mut report),
        containers: or_empty(containers, Section::Containers, &mut report),
        services: or_empty(services, Section::Services, &mut report),
        alerts: Vec::new(),
    };

    snapshot.alerts = alerts::evaluate(&snapshot, thresholds);
    snapshot.timestamp = Utc::now().timestamp_millis();

    report.elapsed = started.elapsed();
    report.alerts = snapshot.alerts.len();
    report.critical = snapshot.critical_alerts().count();

    (snapshot, report)
}

fn or_empty<T: Default>(
    result: Result<T, Elapsed>,
    section: Section,
    report: &mut CycleReport,
) -> T {
    result.unwrap_or_else(|_| {
        warn!("{section} sampling missed the cycle deadline, reporting it empty");
        report.timed_out.push(section);
        T::default()
    })
}

/// Actor that owns the collection timer
pub struct SchedulerActor {
    pipeline: Pipeline,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<SchedulerCommand>,

    interval_duration: Duration,

    /// The cycle started by the last accepted tick
    in_flight: Option<JoinHandle<Arc<CombinedSnapshot>>>,
}

impl SchedulerActor {
    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        info!("starting scheduler");

        let mut ticker = new_ticker(self.interval_duration);
        let mut stopped = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick(),

                command = self.command_rx.recv() => match command {
                    Some(SchedulerCommand::CollectNow { respond_to }) => {
                        debug!("received CollectNow command");
                        self.collect_now(respond_to);
                    }

                    Some(SchedulerCommand::UpdateInterval { interval }) => {
                        debug!("updating interval to {interval:?}");
                        self.interval_duration = interval.max(MIN_INTERVAL);
                        ticker = new_ticker(self.interval_duration);
                    }

                    Some(SchedulerCommand::Shutdown { respond_to }) => {
                        debug!("received shutdown command");
                        stopped = Some(respond_to);
                        break;
                    }

                    None => {
                        warn!("command channel closed, shutting down");
                        break;
                    }
                },
            }
        }

        if let Some(cycle) = self.in_flight.take() {
            cycle.abort();
        }
        self.pipeline.hub.close_all();

        if let Some(respond_to) = stopped {
            let _ = respond_to.send(());
        }
        info!("scheduler stopped");
    }

    fn cycle_running(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|cycle| !cycle.is_finished())
    }

    fn on_tick(&mut self) {
        if self.cycle_running() {
            warn!("previous cycle is still running, skipping this tick");
            self.pipeline
                .stats
                .ticks_skipped
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        let pipeline = self.pipeline.clone();
        self.in_flight = Some(tokio::spawn(async move { pipeline.run().await }));
    }

    /// Start a cycle outside the timer. It runs as the in-flight cycle, so ticks skip
    /// it and shutdown aborts it like any other.
    fn collect_now(&mut self, respond_to: oneshot::Sender<Result<Arc<CombinedSnapshot>>>) {
        if self.cycle_running() {
            let _ = respond_to.send(Err(anyhow::anyhow!(
                "a collection cycle is already running"
            )));
            return;
        }

        let pipeline = self.pipeline.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let snapshot = pipeline.run().await;
            let _ = respond_to.send(Ok(snapshot.clone()));
            snapshot
        }));
    }
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Handle for controlling the scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
    stats: Arc<SchedulerStats>,
}

impl SchedulerHandle {
    /// Spawn the scheduler. The first cycle starts immediately.
    pub fn spawn(
        settings: SchedulerSettings,
        samplers: Samplers,
        latest: Arc<LatestSnapshot>,
        hub: BroadcastHub,
        notifier: Option<CriticalNotifier>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let stats = Arc::new(SchedulerStats::default());

        let actor = SchedulerActor {
            pipeline: Pipeline {
                samplers,
                thresholds: settings.thresholds,
                cycle_timeout: settings.cycle_timeout,
                latest,
                hub,
                notifier,
                stats: stats.clone(),
            },
            command_rx: cmd_rx,
            interval_duration: settings.interval,
            in_flight: None,
        };

        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            stats,
        }
    }

    /// Run a cycle now and wait for its snapshot. Fails when another cycle is running
    /// or the scheduler shuts down before the cycle completes.
    pub async fn collect_now(&self) -> Result<Arc<CombinedSnapshot>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::CollectNow { respond_to: tx })
            .await
            .context("failed to send CollectNow command")?;

        rx.await.context("collection cycle was abandoned")?
    }

    pub async fn update_interval(&self, interval: Duration) -> Result<()> {
        self.sender
            .send(SchedulerCommand::UpdateInterval { interval })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    /// Stop the scheduler and wait until it has disconnected all subscribers
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("scheduler stopped without confirming")
    }

    pub fn cycles_completed(&self) -> u64 {
        self.stats.cycles_completed.load(Ordering::Relaxed)
    }

    /// Cycles in which at least one section missed the deadline
    pub fn partial_cycles(&self) -> u64 {
        self.stats.partial_cycles.load(Ordering::Relaxed)
    }

    /// Ticks dropped because the previous cycle was still running
    pub fn ticks_skipped(&self) -> u64 {
        self.stats.ticks_skipped.load(Ordering::Relaxed)
    }
}
