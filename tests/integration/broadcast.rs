//! Integration tests for the broadcast hub
//!
//! These tests verify that:
//! - A subscriber joining between cycles starts with the latest snapshot
//! - A disconnected or lagging subscriber does not affect delivery to the others
//! - Subscribers see snapshots in publish order under concurrent churn

use std::time::Duration;

use metrics_beacon::{CombinedSnapshot, MetricsMessage, broadcast::BroadcastHub};
use pretty_assertions::assert_eq;

use crate::helpers::{MockSamplers, spawn_scheduler, wait_until, within};

fn snapshot(timestamp: i64) -> CombinedSnapshot {
    CombinedSnapshot {
        timestamp,
        ..Default::default()
    }
}

fn timestamp_of(payload: &str) -> i64 {
    let MetricsMessage::Metrics(snapshot) = serde_json::from_str(payload).unwrap();
    snapshot.timestamp
}

#[tokio::test]
async fn test_mid_interval_subscriber_gets_previous_snapshot() {
    let mocks = MockSamplers::healthy();
    let stack = spawn_scheduler(
        mocks.samplers(),
        Duration::from_secs(3600),
        Duration::from_secs(1),
        None,
    );
    wait_until(Duration::from_secs(2), || stack.scheduler.cycles_completed() == 1).await;
    let latest = stack.latest.reader().get().unwrap();

    let mut subscription = stack.hub.subscribe();
    let payload = within(Duration::from_millis(100), subscription.recv())
        .await
        .unwrap();

    let MetricsMessage::Metrics(received) = serde_json::from_str(&payload).unwrap();
    assert_eq!(received, *latest);
    assert_eq!(received.services.len(), 1);

    stack.scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disconnected_subscriber_is_isolated() {
    let hub = BroadcastHub::new();
    let mut subscriptions: Vec<_> = (0..5).map(|_| hub.subscribe()).collect();

    drop(subscriptions.remove(2));

    let report = hub.publish(&snapshot(1));

    assert_eq!(report.delivered, 4);
    assert_eq!(hub.len(), 4);
    for subscription in &mut subscriptions {
        assert_eq!(timestamp_of(&subscription.recv().await.unwrap()), 1);
    }
}

#[tokio::test]
async fn test_lagging_subscriber_dropped_others_delivered() {
    let hub = BroadcastHub::with_buffer(1);
    let _stuck = hub.subscribe();
    let mut others: Vec<_> = (0..3).map(|_| hub.subscribe()).collect();

    hub.publish(&snapshot(1));
    for other in &mut others {
        other.recv().await.unwrap();
    }

    let report = hub.publish(&snapshot(2));

    assert_eq!(report.delivered, 3);
    assert_eq!(report.dropped, 1);
    assert_eq!(hub.len(), 3);
    for other in &mut others {
        assert_eq!(timestamp_of(&other.recv().await.unwrap()), 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_order_is_preserved_under_churn() {
    let hub = BroadcastHub::with_buffer(256);

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let hub = hub.clone();
            tokio::spawn(async move {
                let mut subscription = hub.subscribe();
                let mut last = i64::MIN;
                let mut seen = 0;

                while let Some(payload) = subscription.recv().await {
                    let timestamp = timestamp_of(&payload);
                    assert!(timestamp > last, "{timestamp} after {last}");
                    last = timestamp;
                    seen += 1;
                }
                seen
            })
        })
        .collect();

    let churn = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                let subscription = hub.subscribe();
                tokio::task::yield_now().await;
                drop(subscription);
            }
        })
    };

    for timestamp in 1..=100 {
        hub.publish(&snapshot(timestamp));
        tokio::task::yield_now().await;
    }
    churn.await.unwrap();
    hub.close_all();

    for reader in readers {
        let seen = reader.await.unwrap();
        assert!(seen > 0);
    }
}
