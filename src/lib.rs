//! AutoNote API Gateway
//!
//! Routes inbound HTTP requests to the AutoNote microservices (auth, notes,
//! content, ai) with background health probing, per-client rate limiting,
//! CORS enforcement, and Prometheus metrics.

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod middleware;
pub mod registry;

pub use error::{AppError, Result};

use std::sync::Arc;
use std::time::Duration;

use config::Settings;
use gateway::forwarder::Forwarder;
use gateway::health::HealthProber;
use metrics::Metrics;
use middleware::rate_limit::SlidingWindowLimiter;
use registry::ServiceRegistry;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,
    pub registry: Arc<ServiceRegistry>,
    pub forwarder: Forwarder,
    pub prober: Arc<HealthProber>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub metrics: Metrics,
}

impl AppState {
    /// Build the full gateway state from settings.
    ///
    /// One pooled HTTP client is shared by the forwarder and the prober;
    /// per-call timeouts are applied at request time.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;

        let mut registry = ServiceRegistry::new();
        for (name, url) in settings.service_urls() {
            registry.register(name, url);
        }
        let registry = Arc::new(registry);

        let prober = Arc::new(HealthProber::new(
            registry.clone(),
            client.clone(),
            Duration::from_secs(settings.health_check_interval),
            Duration::from_secs(settings.health_check_timeout),
        ));
        let forwarder = Forwarder::new(client, Duration::from_secs(settings.request_timeout));
        let limiter = Arc::new(SlidingWindowLimiter::new(settings.rate_limit_per_minute));
        let metrics = Metrics::new()?;

        Ok(Self {
            settings,
            registry,
            forwarder,
            prober,
            limiter,
            metrics,
        })
    }
}
