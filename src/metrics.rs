//! Prometheus instrumentation for gateway traffic

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::warn;

use crate::error::{AppError, Result};

/// Request counters and latency histograms keyed by method, path, and status.
///
/// The registry is owned, not global, so independent gateway instances in
/// one process keep independent metrics. Recording cannot fail once
/// construction succeeds and never touches the response path.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Total HTTP requests handled"),
            &["method", "path", "status"],
        )
        .map_err(|e| AppError::Internal(format!("failed to create request counter: {e}")))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_request_duration_seconds",
                "HTTP request latency in seconds",
            ),
            &["method", "path"],
        )
        .map_err(|e| AppError::Internal(format!("failed to create latency histogram: {e}")))?;

        registry
            .register(Box::new(requests_total.clone()))
            .map_err(|e| AppError::Internal(format!("failed to register counter: {e}")))?;
        registry
            .register(Box::new(request_duration_seconds.clone()))
            .map_err(|e| AppError::Internal(format!("failed to register histogram: {e}")))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration_seconds,
        })
    }

    pub fn record_request(&self, method: &str, path: &str, status: u16) {
        self.requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
    }

    pub fn record_latency(&self, method: &str, path: &str, seconds: f64) {
        self.request_duration_seconds
            .with_label_values(&[method, path])
            .observe(seconds);
    }

    /// Text exposition for `GET /metrics`
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
