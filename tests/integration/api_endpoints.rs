//! Integration tests for the push feed and the query server
//!
//! These tests run both listeners on ephemeral ports and talk to them over real sockets.

use std::{net::SocketAddr, time::Duration};

use futures::StreamExt;
use metrics_beacon::{
    MetricsMessage,
    api::{ApiState, Server, spawn_push_server, spawn_query_server},
    config::Thresholds,
};
use pretty_assertions::assert_eq;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::helpers::{MockSamplers, Stack, spawn_scheduler, wait_until, within};

struct Running {
    stack: Stack,
    push: Server,
    query: Server,
    stop: watch::Sender<bool>,
}

async fn start(interval: Duration) -> Running {
    let mocks = MockSamplers::healthy();
    let stack = spawn_scheduler(mocks.samplers(), interval, Duration::from_secs(1), None);
    let state = ApiState::new(
        stack.latest.reader(),
        stack.hub.clone(),
        Thresholds::default(),
    );

    let any_port: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let (stop, stop_rx) = watch::channel(false);
    let push = spawn_push_server(any_port, state.clone(), stop_rx.clone())
        .await
        .unwrap();
    let query = spawn_query_server(any_port, state, stop_rx).await.unwrap();

    Running {
        stack,
        push,
        query,
        stop,
    }
}

async fn next_snapshot<S>(ws: &mut S) -> metrics_beacon::CombinedSnapshot
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = within(Duration::from_secs(2), ws.next())
            .await
            .expect("feed ended")
            .expect("feed failed");

        if let Message::Text(text) = message {
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["type"], "metrics");

            let MetricsMessage::Metrics(snapshot) = serde_json::from_value(value).unwrap();
            return snapshot;
        }
    }
}

#[tokio::test]
async fn test_query_endpoints() {
    let running = start(Duration::from_secs(3600)).await;
    wait_until(Duration::from_secs(2), || {
        running.stack.scheduler.cycles_completed() == 1
    })
    .await;
    let base = format!("http://{}", running.query.addr);

    let metrics: serde_json::Value = reqwest::get(format!("{base}/metrics"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let latest = running.stack.latest.reader().get().unwrap();
    assert_eq!(metrics["timestamp"], latest.timestamp);
    assert_eq!(metrics["services"]["api"]["status"], "healthy");
    assert_eq!(metrics["services"]["api"]["responseTime"], 25);
    assert_eq!(metrics["containers"]["web"]["state"], "running");
    assert_eq!(metrics["system"]["load"].as_array().unwrap().len(), 3);

    let response = reqwest::Client::new()
        .get(format!("{base}/health"))
        .header("Origin", "http://dashboard.local")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let health: serde_json::Value = response.json().await.unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["subscribers"], 0);
    assert_eq!(health["lastCycle"], latest.timestamp);

    running.stack.scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_feed_starts_with_latest_then_follows_cycles() {
    let running = start(Duration::from_secs(3600)).await;
    wait_until(Duration::from_secs(2), || {
        running.stack.scheduler.cycles_completed() == 1
    })
    .await;
    let latest = running.stack.latest.reader().get().unwrap();

    let url = format!("ws://{}/ws", running.push.addr);
    let (mut ws, _) = connect_async(url).await.unwrap();

    let first = next_snapshot(&mut ws).await;
    assert_eq!(first, *latest);

    wait_until(Duration::from_secs(2), || running.stack.hub.len() == 1).await;
    let collected = running.stack.scheduler.collect_now().await.unwrap();

    let second = next_snapshot(&mut ws).await;
    assert_eq!(second, *collected);
    assert!(second.timestamp >= first.timestamp);

    running.stack.scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_feed_on_root_path_and_disconnect() {
    let running = start(Duration::from_secs(3600)).await;
    wait_until(Duration::from_secs(2), || {
        running.stack.scheduler.cycles_completed() == 1
    })
    .await;

    let url = format!("ws://{}/", running.push.addr);
    let (mut ws, _) = connect_async(url).await.unwrap();
    next_snapshot(&mut ws).await;
    wait_until(Duration::from_secs(2), || running.stack.hub.len() == 1).await;

    ws.close(None).await.unwrap();
    drop(ws);

    wait_until(Duration::from_secs(2), || running.stack.hub.is_empty()).await;
    running.stack.scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_graceful_shutdown() {
    let running = start(Duration::from_millis(100)).await;
    wait_until(Duration::from_secs(2), || {
        running.stack.scheduler.cycles_completed() >= 1
    })
    .await;

    let url = format!("ws://{}/ws", running.push.addr);
    let (mut ws, _) = connect_async(url).await.unwrap();
    next_snapshot(&mut ws).await;

    running.stack.scheduler.shutdown().await.unwrap();

    // the feed ends with a close frame once the hub lets go
    within(Duration::from_secs(2), async {
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await;

    let query = format!("http://{}/health", running.query.addr);
    running.stop.send(true).unwrap();
    within(Duration::from_secs(5), async {
        tokio::join!(running.push.stopped(), running.query.stopped());
    })
    .await;

    assert!(reqwest::get(query).await.is_err());
}
