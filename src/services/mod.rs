// src/services/mod.rs
mod simulated;

use std::sync::Arc;
use async_trait::async_trait;
use tracing::info;

use crate::engine::{AsyncTaskGroup, CancellationToken, Outcome, TaskGroup};
use crate::error::GroupResult;

pub use simulated::SimulatedService;

/// A remote service that can be asked for a response by name
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Fetch the response of `service`. Implementations may poll `token` to stop early.
    async fn fetch(&self, service: &str, token: &CancellationToken) -> anyhow::Result<String>;
}

/// Submit one task per service to `group`, labelled by service name.
pub fn submit_services<C>(group: &mut AsyncTaskGroup, client: Arc<C>, services: &[String]) -> GroupResult<()>
where
    C: ServiceClient + ?Sized + 'static,
{
    for service in services {
        let client = client.clone();
        let name = service.clone();
        group.submit_cancellable(service.clone(), move |token| async move {
            client.fetch(&name, &token).await
        })?;
    }
    Ok(())
}

/// Call every service concurrently and wait for all of them
pub async fn fetch_all<C>(group: &mut AsyncTaskGroup, client: Arc<C>, services: &[String]) -> Outcome
where
    C: ServiceClient + ?Sized + 'static,
{
    info!("Fetching {} services", services.len());
    submit_services(group, client, services)?;
    group.join().await
}

/// Thread-backed counterpart of [`fetch_all`] for the simulated service
pub fn fetch_all_blocking(group: &mut TaskGroup<'_>, service: &SimulatedService, services: &[String]) -> Outcome {
    info!("Fetching {} services on worker threads", services.len());
    for name in services {
        let service = service.clone();
        let name = name.clone();
        group.submit_cancellable(name.clone(), move |token| service.fetch_blocking(&name, token))?;
    }
    group.join()
}
