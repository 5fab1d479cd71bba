//! Reverse-proxy forwarding to upstream services

use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{
        header::{HeaderMap, HeaderName, CONTENT_LENGTH, CONTENT_TYPE, HOST},
        Request,
    },
    response::Response,
};
use reqwest::Client;
use tracing::{debug, error};

use crate::error::{AppError, Result};

/// Connection-oriented headers that must not be relayed across hops
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Relays inbound requests to an upstream service over a pooled client.
///
/// Method, headers (including `Authorization`), query string, and raw body
/// are preserved; the upstream's status, headers, and body are relayed back
/// verbatim. Only JSON bodies are parsed (and re-emitted); anything else
/// passes through as raw bytes so binary payloads survive intact.
#[derive(Clone)]
pub struct Forwarder {
    client: Client,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Forward `req` to `{base_url}{path_and_query}`.
    ///
    /// Transport failures and unparseable JSON responses map to
    /// `AppError::Forwarding` naming `service`; the underlying error goes to
    /// the log only.
    pub async fn forward(
        &self,
        service: &str,
        base_url: &str,
        req: Request<Body>,
    ) -> Result<Response> {
        let (parts, body) = req.into_parts();
        let body = to_bytes(body, usize::MAX)
            .await
            .map_err(|e| AppError::Internal(format!("failed to read request body: {e}")))?;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", base_url, path_and_query);

        debug!(service = %service, method = %parts.method, url = %url, "forwarding request");

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(strip_per_hop_headers(&parts.headers))
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!(service = %service, url = %url, error = %e, "failed to forward request");
                AppError::Forwarding {
                    service: service.to_string(),
                }
            })?;

        let status = upstream.status();
        let headers = strip_per_hop_headers(upstream.headers());
        let is_json = upstream
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_start().starts_with("application/json"))
            .unwrap_or(false);

        let bytes = upstream.bytes().await.map_err(|e| {
            error!(service = %service, url = %url, error = %e, "failed to read upstream response");
            AppError::Forwarding {
                service: service.to_string(),
            }
        })?;

        let body = if is_json && !bytes.is_empty() {
            let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
                error!(service = %service, url = %url, error = %e, "unparseable JSON from upstream");
                AppError::Forwarding {
                    service: service.to_string(),
                }
            })?;
            Body::from(serde_json::to_vec(&value).map_err(|e| {
                AppError::Internal(format!("failed to re-serialize upstream JSON: {e}"))
            })?)
        } else {
            Body::from(bytes)
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Copy a header map, dropping hop-by-hop headers plus `host` and
/// `content-length` (both recomputed for the next hop).
fn strip_per_hop_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if is_per_hop(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn is_per_hop(name: &HeaderName) -> bool {
    name == HOST || name == CONTENT_LENGTH || HOP_BY_HOP_HEADERS.contains(&name.as_str())
}
