//! Service health checks
//!
//! Every configured service is probed concurrently, so a cycle waits for the slowest
//! probe rather than the sum of all of them.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use reqwest::StatusCode;
use tracing::{debug, instrument, trace};

use crate::{
    ServiceMap, ServiceSnapshot,
    config::{CommandProbe, HttpMethod, HttpProbe, Probe, ServiceConfig},
    error::{ProbeError, ProbeResult},
    executor::CommandExecutor,
    monitors::Sampler,
};

pub struct ServiceHealthChecker {
    client: reqwest::Client,
    executor: CommandExecutor,
    services: Vec<CheckedService>,
}

/// A configured service with its body pattern compiled once
struct CheckedService {
    config: ServiceConfig,
    body_pattern: Option<Regex>,
}

impl CheckedService {
    fn new(config: ServiceConfig) -> anyhow::Result<Self> {
        let body_pattern = match &config.probe {
            Probe::Http(HttpProbe {
                body_pattern: Some(pattern),
                ..
            }) => Some(Regex::new(pattern).with_context(|| {
                format!("invalid body pattern '{pattern}' for service {}", config.name)
            })?),
            _ => None,
        };

        Ok(Self {
            config,
            body_pattern,
        })
    }
}

impl ServiceHealthChecker {
    /// Fails when a configured body pattern is not a valid regex.
    pub fn new(services: Vec<ServiceConfig>, executor: CommandExecutor) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        let services = services
            .into_iter()
            .map(CheckedService::new)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            client,
            executor,
            services,
        })
    }

    /// Probe every configured service and key the results by service name.
    #[instrument(skip_all, fields(services = self.services.len()))]
    pub async fn check(&self) -> ServiceMap {
        let results =
            join_all(self.services.iter().map(|service| self.check_service(service))).await;

        self.services
            .iter()
            .map(|service| service.config.name.clone())
            .zip(results)
            .collect()
    }

    #[instrument(skip_all, fields(service = %service.config.name))]
    async fn check_service(&self, service: &CheckedService) -> ServiceSnapshot {
        let critical = service.config.critical;
        let result = match &service.config.probe {
            Probe::Http(probe) => self
                .probe_http(probe, service.body_pattern.as_ref())
                .await
                .map(Some),
            Probe::Command(probe) => self.probe_command(probe).await.map(|_| None),
        };

        match result {
            Ok(response_time) => {
                trace!("service is healthy ({response_time:?}ms)");
                ServiceSnapshot::healthy(critical, response_time)
            }
            Err(e) => {
                debug!("service is unhealthy: {e}");
                ServiceSnapshot::unhealthy(critical, e)
            }
        }
    }

    /// Returns the round-trip time in milliseconds.
    async fn probe_http(&self, probe: &HttpProbe, pattern: Option<&Regex>) -> ProbeResult<u64> {
        let timeout = Duration::from_secs(probe.timeout.max(1));
        let start = Instant::now();

        let (status, body) = self.execute_request(probe, timeout).await?;
        let response_time = start.elapsed().as_millis() as u64;

        evaluate_response(probe, pattern, status, &body)?;
        Ok(response_time)
    }

    async fn execute_request(
        &self,
        probe: &HttpProbe,
        timeout: Duration,
    ) -> ProbeResult<(StatusCode, String)> {
        let method = match probe.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Post => reqwest::Method::POST,
        };

        let response = self
            .client
            .request(method, &probe.url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(&probe.url, timeout, e))?;

        let status = response.status();

        // the body is only needed when it has to match something
        let body = if probe.body_pattern.is_none() || probe.method == HttpMethod::Head {
            String::new()
        } else {
            response
                .text()
                .await
                .map_err(|e| request_error(&probe.url, timeout, e))?
        };

        Ok((status, body))
    }

    async fn probe_command(&self, probe: &CommandProbe) -> ProbeResult<()> {
        let timeout = probe
            .timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.executor.timeout());

        self.executor
            .run_shell_with_timeout(&probe.command, timeout)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Sampler for ServiceHealthChecker {
    type Output = ServiceMap;

    async fn sample(&self) -> ServiceMap {
        self.check().await
    }
}

fn request_error(url: &str, timeout: Duration, err: reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        ProbeError::timeout(url, timeout)
    } else if err.is_connect() {
        ProbeError::Failure(format!("could not connect to {url}"))
    } else {
        ProbeError::Failure(err.to_string())
    }
}

/// A response is healthy when its status is expected (or below 400 when nothing is
/// configured) and its body matches the configured pattern.
fn evaluate_response(
    probe: &HttpProbe,
    pattern: Option<&Regex>,
    status: StatusCode,
    body: &str,
) -> ProbeResult<()> {
    let status_ok = match &probe.expected_status {
        Some(expected) => expected.contains(&status.as_u16()),
        None => !status.is_client_error() && !status.is_server_error(),
    };

    if !status_ok {
        return Err(ProbeError::Failure(format!("unexpected status {status}")));
    }

    if let Some(re) = pattern
        && !re.is_match(body)
    {
        return Err(ProbeError::Failure(format!(
            "response body does not match '{}'",
            re.as_str()
        )));
    }

    Ok(())
}
