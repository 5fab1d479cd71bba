//! Background health prober for registered services

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::ServiceRegistry;

/// Periodically probes `GET {base_url}/health` on every registered service
/// and records the outcome in the registry's health cache.
///
/// The prober is the cache's only writer. A cycle never fails: probe errors
/// are logged and become `unhealthy` entries, and a failing service is
/// simply retried on the next tick.
pub struct HealthProber {
    registry: Arc<ServiceRegistry>,
    client: Client,
    interval: Duration,
    probe_timeout: Duration,
    probe_task: RwLock<Option<JoinHandle<()>>>,
}

impl HealthProber {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        client: Client,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            client,
            interval,
            probe_timeout,
            probe_task: RwLock::new(None),
        }
    }

    /// Start the background probe loop. The first cycle runs immediately.
    pub async fn start(&self) {
        let registry = self.registry.clone();
        let client = self.client.clone();
        let interval = self.interval;
        let probe_timeout = self.probe_timeout;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                probe_cycle(&registry, &client, probe_timeout).await;
            }
        });

        *self.probe_task.write().await = Some(handle);
        info!(
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.probe_timeout.as_secs(),
            "started health prober"
        );
    }

    /// Stop the background probe loop
    pub async fn stop(&self) {
        if let Some(handle) = self.probe_task.write().await.take() {
            handle.abort();
            info!("stopped health prober");
        }
    }

    /// Run a single probe cycle inline, updating the cache
    pub async fn run_once(&self) {
        probe_cycle(&self.registry, &self.client, self.probe_timeout).await;
    }

    /// Point-in-time check of every service, used by `GET /health/services`.
    ///
    /// Independent of the cached state: results are returned to the caller
    /// and never written back, so the background loop stays the single
    /// writer.
    pub async fn check_services_now(&self) -> BTreeMap<String, &'static str> {
        let probes = self.registry.services().map(|(name, base_url)| {
            let url = format!("{}/health", base_url);
            let client = &self.client;
            let timeout = self.probe_timeout;
            async move {
                let label = if probe(client, &url, timeout).await {
                    "healthy"
                } else {
                    "unhealthy"
                };
                (name.to_string(), label)
            }
        });

        join_all(probes).await.into_iter().collect()
    }
}

/// Probe all registered services concurrently and record the outcomes
async fn probe_cycle(registry: &ServiceRegistry, client: &Client, timeout: Duration) {
    let probes = registry.services().map(|(name, base_url)| {
        let url = format!("{}/health", base_url);
        async move { (name, probe(client, &url, timeout).await) }
    });

    for (name, healthy) in join_all(probes).await {
        if healthy {
            debug!(service = %name, "health probe passed");
        } else {
            warn!(service = %name, "health probe failed");
        }
        registry.mark(name, healthy);
    }
}

/// A 2xx response within the timeout is the only healthy outcome
async fn probe(client: &Client, url: &str, timeout: Duration) -> bool {
    match client.get(url).timeout(timeout).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            debug!(url = %url, error = %e, "probe request failed");
            false
        }
    }
}
