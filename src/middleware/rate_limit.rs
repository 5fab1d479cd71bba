//! Per-client sliding-window rate limiting

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::error::AppError;

const WINDOW: Duration = Duration::from_secs(60);

/// Exact-count sliding-window admission control, one window per client.
///
/// Each admission prunes the client's timestamps older than the trailing
/// 60-second window before counting, so there is no fixed-bucket boundary
/// burst. Windows live behind their own lock inside a concurrent map:
/// decisions for one client are linearized, unrelated clients do not
/// contend.
pub struct SlidingWindowLimiter {
    limit: usize,
    windows: DashMap<String, Mutex<VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit: limit_per_minute as usize,
            windows: DashMap::new(),
        }
    }

    /// Admit or reject a request from `client_id` at the current instant
    pub fn admit(&self, client_id: &str) -> bool {
        self.admit_at(client_id, Instant::now())
    }

    /// Deterministic admission: prune, count against the limit, record.
    pub fn admit_at(&self, client_id: &str, now: Instant) -> bool {
        let entry = self
            .windows
            .entry(client_id.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut window = entry.lock();

        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.limit {
            return false;
        }
        window.push_back(now);
        true
    }

    /// Drop clients whose windows hold no in-window timestamp, bounding
    /// memory to the set of recently active clients.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    /// Deterministic eviction counterpart of `admit_at`
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            let window = window.lock();
            window
                .back()
                .is_some_and(|&last| now.duration_since(last) < WINDOW)
        });
        before - self.windows.len()
    }

    /// Number of client windows currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Start the periodic idle-window sweep
    pub fn start_eviction(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The immediate first tick has nothing to sweep yet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = limiter.evict_idle();
                if evicted > 0 {
                    debug!(evicted, "evicted idle rate-limit windows");
                }
            }
        })
    }
}

/// Rate limiting layer
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<SlidingWindowLimiter>,
    api_key_header: Arc<str>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<SlidingWindowLimiter>, api_key_header: &str) -> Self {
        Self {
            limiter,
            api_key_header: Arc::from(api_key_header),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
            api_key_header: self.api_key_header.clone(),
        }
    }
}

/// Rate limiting middleware service
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: Arc<SlidingWindowLimiter>,
    api_key_header: Arc<str>,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Operator endpoints stay reachable for throttled clients.
        let path = request.uri().path();
        if path == "/health" || path == "/health/services" || path == "/metrics" {
            let future = self.inner.call(request);
            return Box::pin(async move { future.await });
        }

        let client_id = client_id(&request, &self.api_key_header);
        if self.limiter.admit(&client_id) {
            let future = self.inner.call(request);
            Box::pin(async move { future.await })
        } else {
            warn!(client = %client_id, "rate limit exceeded");
            Box::pin(async move { Ok(AppError::RateLimited.into_response()) })
        }
    }
}

/// Client identity: the API-key header when present, else the peer address.
fn client_id(request: &Request<Body>, api_key_header: &str) -> String {
    if let Some(key) = request
        .headers()
        .get(api_key_header)
        .and_then(|v| v.to_str().ok())
        .filter(|key| !key.is_empty())
    {
        return key.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
