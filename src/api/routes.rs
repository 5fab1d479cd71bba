//! HTTP surface: local handlers, the proxy fallback, and the middleware stack

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, warn};

use crate::{config::Settings, error::AppError, middleware::rate_limit::RateLimitLayer, AppState};

/// Assemble the gateway router.
///
/// Layer order, outermost first: metrics timing, trace, CORS, rate limit.
/// Metrics sit outermost so every completed response is counted exactly
/// once with total gateway-observed latency; CORS wraps the limiter so 429s
/// carry the browser headers too.
pub fn create_router(state: Arc<AppState>) -> Router {
    let rate_limit = RateLimitLayer::new(state.limiter.clone(), &state.settings.api_key_header);

    Router::new()
        .route("/health", get(health))
        .route("/health/services", get(service_health))
        .route("/metrics", get(metrics))
        .fallback(proxy)
        .layer(rate_limit)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors_layer(&state.settings))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .with_state(state)
}

/// Local liveness probe with the cached per-service health snapshot
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "services": state.registry.snapshot(),
    }))
}

/// Synchronous point-in-time probe of every backend
async fn service_health(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, &'static str>> {
    Json(state.prober.check_services_now().await)
}

/// Prometheus text exposition
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

/// Fallback handler: resolve the first path segment to a service and relay.
async fn proxy(State(state): State<Arc<AppState>>, req: Request<Body>) -> Response {
    // Preflight and every other OPTIONS request is answered locally; the
    // CORS layer has already attached the policy headers.
    if req.method() == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }

    let service = match first_segment(req.uri().path()) {
        Some(segment) => segment.to_string(),
        None => return AppError::UnknownService("/".to_string()).into_response(),
    };

    let base_url = match state.registry.url_for(&service) {
        Ok(url) => url.to_string(),
        Err(e) => return e.into_response(),
    };

    // Stale health never blocks routing; the transport outcome decides.
    if !state.registry.is_healthy(&service) {
        debug!(service = %service, "forwarding to service with no healthy probe on record");
    }

    match state.forwarder.forward(&service, &base_url, req).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

fn first_segment(path: &str) -> Option<&str> {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
}

/// Record counter and latency once per completed request, local or forwarded
async fn track_requests(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    state
        .metrics
        .record_request(&method, &path, response.status().as_u16());
    state
        .metrics
        .record_latency(&method, &path, start.elapsed().as_secs_f64());
    response
}

/// Convert a panicking handler into the standard 500 envelope instead of a
/// dropped connection. Detail goes to the log only.
fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "opaque panic payload".to_string()
    };
    error!(panic = %detail, "request handler panicked");
    AppError::Internal(detail).into_response()
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    // The wildcard origin cannot be combined with credentials, so "*" is
    // served by mirroring the request origin instead.
    let origin = if settings.cors_allow_origin == "*" {
        AllowOrigin::mirror_request()
    } else {
        match HeaderValue::from_str(&settings.cors_allow_origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                warn!(
                    origin = %settings.cors_allow_origin,
                    "invalid CORS_ALLOW_ORIGIN, mirroring request origins"
                );
                AllowOrigin::mirror_request()
            }
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
}
