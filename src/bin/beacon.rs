use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use metrics_beacon::{
    actors::{SchedulerHandle, SchedulerSettings},
    api::{ApiState, spawn_push_server, spawn_query_server},
    broadcast::BroadcastHub,
    config::{Config, read_config_file},
    latest::LatestSnapshot,
    monitors::Samplers,
    notifier::CriticalNotifier,
    util,
};
use tokio::sync::watch;
use tracing::{debug, info, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults are used when omitted)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let level = util::get_log_level();
    let filter =
        filter::Targets::new().with_targets(vec![("metrics_beacon", level), ("beacon", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    }
    .with_env_overrides();
    debug!("effective config: {config:?}");

    let samplers = Samplers::from_config(&config)?;
    let notifier = config
        .notifier
        .clone()
        .map(CriticalNotifier::new)
        .transpose()?;

    let latest = Arc::new(LatestSnapshot::new());
    let hub = BroadcastHub::new();
    let state = ApiState::new(latest.reader(), hub.clone(), config.thresholds.clone());

    let (stop_tx, stop_rx) = watch::channel(false);
    let push = spawn_push_server(config.push_addr(), state.clone(), stop_rx.clone())
        .await
        .context("failed to start push server")?;
    let query = spawn_query_server(config.query_addr(), state, stop_rx)
        .await
        .context("failed to start query server")?;

    let scheduler = SchedulerHandle::spawn(
        SchedulerSettings::from_config(&config),
        samplers,
        latest,
        hub,
        notifier,
    );
    info!(
        "collecting every {:?}, feed on {}, queries on {}",
        config.interval(),
        push.addr,
        query.addr
    );

    shutdown_signal().await;
    info!("shutting down");

    scheduler.shutdown().await?;
    let _ = stop_tx.send(true);
    tokio::join!(push.stopped(), query.stopped());

    info!(
        "stopped after {} cycles ({} partial, {} ticks skipped)",
        scheduler.cycles_completed(),
        scheduler.partial_cycles(),
        scheduler.ticks_skipped()
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
