//! Samplers for the three sections of a snapshot
//!
//! Each sampler is infallible from the caller's point of view: whatever goes wrong while
//! reading a metric turns into a zeroed value, an empty map or an unhealthy entry.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use crate::{ContainerMap, ServiceMap, SystemSnapshot, config::Config, executor::CommandExecutor};

pub mod containers;
pub mod services;
pub mod system;

pub use containers::{ContainerRuntime, ContainerSampler, DockerRuntime};
pub use services::ServiceHealthChecker;
pub use system::SystemSampler;

#[async_trait]
pub trait Sampler: Send + Sync {
    type Output: Default + Send;

    async fn sample(&self) -> Self::Output;
}

/// The samplers one collection cycle runs concurrently.
#[derive(Clone)]
pub struct Samplers {
    pub system: Arc<dyn Sampler<Output = SystemSnapshot>>,
    pub containers: Arc<dyn Sampler<Output = ContainerMap>>,
    pub services: Arc<dyn Sampler<Output = ServiceMap>>,
}

impl Samplers {
    /// Build the host, docker and service samplers described by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let executor = CommandExecutor::new(config.command_timeout());
        let runtime = DockerRuntime::connect(config.command_timeout())
            .context("failed to set up the docker engine client")?;

        Ok(Self {
            system: Arc::new(SystemSampler::new()),
            containers: Arc::new(ContainerSampler::new(
                Arc::new(runtime),
                config.command_timeout(),
            )),
            services: Arc::new(ServiceHealthChecker::new(
                config.services.clone(),
                executor,
            )?),
        })
    }
}
