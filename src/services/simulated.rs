// src/services/simulated.rs
use std::thread;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::engine::{CancellationExt, Cancelled, CancellationToken, TaskSpec};
use super::ServiceClient;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Stand-in for a remote call: waits a fixed delay, then answers `"<service> response"`.
#[derive(Debug, Clone)]
pub struct SimulatedService {
    pub delay: Duration,
    pub failure: Option<String>,
    pub cooperative: bool,
}

impl Default for SimulatedService {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            failure: None,
            cooperative: false,
        }
    }
}

impl SimulatedService {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_ms),
            failure: None,
            cooperative: config.cooperative,
        }
    }

    /// Service behaviour for one task spec, falling back to `self` for unset fields
    pub fn for_spec(&self, spec: &TaskSpec) -> Self {
        Self {
            delay: spec.delay_ms.map(Duration::from_millis).unwrap_or(self.delay),
            failure: spec.fail.clone(),
            cooperative: self.cooperative,
        }
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn cooperative(mut self, cooperative: bool) -> Self {
        self.cooperative = cooperative;
        self
    }

    fn respond(&self, service: &str) -> anyhow::Result<String> {
        Ok(format!("{} response", service))
    }

    /// Blocking variant for thread-backed groups
    pub fn fetch_blocking(&self, service: &str, token: &CancellationToken) -> anyhow::Result<String> {
        if let Some(message) = &self.failure {
            anyhow::bail!("{}", message);
        }
        debug!("Calling {} (blocking, {:?})", service, self.delay);

        if !self.cooperative {
            thread::sleep(self.delay);
            return self.respond(service);
        }

        let deadline = Instant::now() + self.delay;
        loop {
            token.check()?;
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
        self.respond(service)
    }
}

#[async_trait]
impl ServiceClient for SimulatedService {
    async fn fetch(&self, service: &str, token: &CancellationToken) -> anyhow::Result<String> {
        if let Some(message) = &self.failure {
            anyhow::bail!("{}", message);
        }
        debug!("Calling {} ({:?})", service, self.delay);

        if self.cooperative {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = token.cancelled() => return Err(Cancelled.into()),
            }
        } else {
            tokio::time::sleep(self.delay).await;
        }
        self.respond(service)
    }
}
