//! Critical notifier - delivers a condensed summary of a cycle's critical alerts
//!
//! Delivery runs detached from the cycle. A failed delivery is logged by the caller and
//! never feeds back into the cycle.

use std::{fmt, time::Duration};

use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, trace};

use crate::{alerts::Alert, config::Notifier, discord};

pub const PUSH_TITLE: &str = "⚠️ Critical Alert";

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Body POSTed to a push delivery endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
}

impl PushPayload {
    pub fn from_alerts<'a>(alerts: impl IntoIterator<Item = &'a Alert>) -> Self {
        let body = alerts
            .into_iter()
            .map(|alert| alert.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            title: PUSH_TITLE.to_string(),
            body,
        }
    }
}

#[derive(Debug)]
pub enum NotifyError {
    /// The request could not be sent or timed out
    Request(reqwest::Error),

    /// The endpoint answered with a non-success status
    Status { status: StatusCode, body: String },
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Request(err) => write!(f, "notification request failed: {}", err),
            NotifyError::Status { status, body } if body.is_empty() => {
                write!(f, "notification rejected with {}", status)
            }
            NotifyError::Status { status, body } => {
                write!(f, "notification rejected with {}: {}", status, body)
            }
        }
    }
}

impl std::error::Error for NotifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NotifyError::Request(err) => Some(err),
            NotifyError::Status { .. } => None,
        }
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Request(err)
    }
}

#[derive(Debug, Clone)]
pub struct CriticalNotifier {
    client: Client,
    target: Notifier,
}

impl CriticalNotifier {
    pub fn new(target: Notifier) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .context("failed to build notifier HTTP client")?;

        Ok(Self { client, target })
    }

    /// Send every critical alert in `alerts` as one notification. Does nothing when
    /// none of them is critical.
    #[instrument(skip_all, fields(alerts = alerts.len()))]
    pub async fn notify(&self, alerts: &[Alert]) -> Result<(), NotifyError> {
        let critical: Vec<&Alert> = alerts.iter().filter(|alert| alert.is_critical()).collect();
        if critical.is_empty() {
            trace!("no critical alerts, nothing to deliver");
            return Ok(());
        }

        let request = match &self.target {
            Notifier::Push(push) => self
                .client
                .post(&push.url)
                .json(&PushPayload::from_alerts(critical.iter().copied())),
            Notifier::Discord(target) => self.client.post(&target.url).json(
                &discord::critical_alerts_message(&critical, target.user_id.as_deref()),
            ),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status { status, body });
        }

        info!("delivered {} critical alerts", critical.len());
        Ok(())
    }
}
