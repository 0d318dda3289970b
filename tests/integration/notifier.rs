//! Integration tests for critical alert delivery
//!
//! These tests verify that:
//! - Push and Discord targets receive the condensed alert summary
//! - Delivery failures surface as errors to the caller only
//! - A cycle with critical alerts triggers exactly one notification

use std::time::Duration;

use assert_matches::assert_matches;
use metrics_beacon::{
    ContainerMap, ContainerState, ServiceMap,
    alerts::{Alert, Category, Severity},
    config::{Discord, Notifier, Push},
    notifier::{CriticalNotifier, NotifyError, PushPayload},
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{MockSampler, MockSamplers, container, spawn_scheduler, system, wait_until};

fn push_notifier(server: &MockServer) -> CriticalNotifier {
    CriticalNotifier::new(Notifier::Push(Push {
        url: format!("{}/api/broadcast", server.uri()),
    }))
    .unwrap()
}

fn alerts() -> Vec<Alert> {
    vec![
        Alert::new(Severity::Warning, Category::System, "High CPU usage: 91.0%"),
        Alert::new(Severity::Critical, Category::System, "Critical disk usage: 95%"),
        Alert::new(
            Severity::Critical,
            Category::Container,
            "Container db is not running (exited)",
        )
        .subject("db"),
    ]
}

#[tokio::test]
async fn test_push_delivery() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/broadcast"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    push_notifier(&mock_server).notify(&alerts()).await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let payload: PushPayload = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(payload.title, "⚠️ Critical Alert");
    assert_eq!(
        payload.body,
        "Critical disk usage: 95%; Container db is not running (exited)"
    );
}

#[tokio::test]
async fn test_nothing_sent_without_critical_alerts() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let warnings = vec![Alert::new(Severity::Warning, Category::System, "High memory usage: 90.0%")];
    push_notifier(&mock_server).notify(&warnings).await.unwrap();
}

#[tokio::test]
async fn test_rejected_delivery() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&mock_server)
        .await;

    let err = push_notifier(&mock_server)
        .notify(&alerts())
        .await
        .unwrap_err();

    assert_matches!(err, NotifyError::Status { status, ref body } if status.as_u16() == 503 && body == "maintenance");
}

#[tokio::test]
async fn test_unreachable_endpoint() {
    let notifier = CriticalNotifier::new(Notifier::Push(Push {
        url: "http://127.0.0.1:1/api/broadcast".to_string(),
    }))
    .unwrap();

    assert_matches!(notifier.notify(&alerts()).await, Err(NotifyError::Request(_)));
}

#[tokio::test]
async fn test_discord_delivery() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = CriticalNotifier::new(Notifier::Discord(Discord {
        url: format!("{}/webhook", mock_server.uri()),
        user_id: Some("42".to_string()),
    }))
    .unwrap();
    notifier.notify(&alerts()).await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["content"], "<@42>");
    assert_eq!(body["embeds"][0]["fields"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_cycle_with_critical_alerts_notifies() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/broadcast"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let mocks = MockSamplers::new(
        MockSampler::new(system(10.0, 10.0, 95)),
        MockSampler::new(ContainerMap::from([(
            "db".to_string(),
            container(ContainerState::Exited, 0.0),
        )])),
        MockSampler::new(ServiceMap::new()),
    );
    let stack = spawn_scheduler(
        mocks.samplers(),
        Duration::from_secs(3600),
        Duration::from_secs(1),
        Some(push_notifier(&mock_server)),
    );

    wait_until(Duration::from_secs(2), || stack.scheduler.cycles_completed() == 1).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let payload: PushPayload = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        payload.body,
        "Critical disk usage: 95%; Container db is not running (exited)"
    );

    stack.scheduler.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failing_notifier_does_not_break_the_cycle() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let mocks = MockSamplers::new(
        MockSampler::new(system(10.0, 10.0, 95)),
        MockSampler::new(ContainerMap::new()),
        MockSampler::new(ServiceMap::new()),
    );
    let stack = spawn_scheduler(
        mocks.samplers(),
        Duration::from_millis(50),
        Duration::from_secs(1),
        Some(push_notifier(&mock_server)),
    );

    wait_until(Duration::from_secs(2), || stack.scheduler.cycles_completed() >= 3).await;
    assert!(stack.latest.reader().get().unwrap().critical_alerts().count() == 1);

    stack.scheduler.shutdown().await.unwrap();
}
