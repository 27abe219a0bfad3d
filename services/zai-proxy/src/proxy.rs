//! Request forwarder
//!
//! Takes a token from the pool for every inbound request, forwards the
//! request to the upstream origin with that token as bearer, and reports the
//! upstream status back to the pool. Clients authenticate with the service
//! API key as bearer before a token is taken; that header is never
//! forwarded. Upstream responses, including error statuses, are streamed back
//! as-is so server-sent events reach the client unbuffered.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use common::Secret;
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use token_pool::{Outcome, Pool, classify_status};
use tracing::{error, instrument, warn};

use crate::metrics;

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Largest inbound body accepted for forwarding.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Request counters surfaced on `/health`
#[derive(Debug, Clone)]
pub struct ForwardCounters {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for ForwardCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwardCounters {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    fn error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }
}

/// Shared state passed to the forwarder via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub pool: Arc<Pool>,
    pub client: reqwest::Client,
    pub base_url: String,
    pub timeout: Duration,
    /// Key clients present as `Authorization: Bearer <key>`
    pub api_key: Arc<Secret<String>>,
    pub counters: ForwardCounters,
}

/// JSON error body: {"error":{"type":"...","message":"...","request_id":"req_..."}}
pub fn error_response(
    status: StatusCode,
    error_type: &str,
    message: &str,
    request_id: &str,
) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Forward an inbound request with a pool token and record request metrics.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(
    state: &ProxyState,
    request: axum::http::Request<Body>,
    request_id: String,
) -> Response {
    let started = Instant::now();
    state
        .counters
        .requests_total
        .fetch_add(1, Ordering::Relaxed);
    let method = request.method().clone();

    let response = forward(state, request, &request_id).await;

    metrics::record_request(
        response.status().as_u16(),
        method.as_str(),
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn forward(
    state: &ProxyState,
    request: axum::http::Request<Body>,
    request_id: &str,
) -> Response {
    if !is_authorized(request.headers(), &state.api_key) {
        state.counters.error();
        warn!("rejected request without a valid API key");
        return error_response(
            StatusCode::UNAUTHORIZED,
            "authentication_error",
            "missing or invalid API key",
            request_id,
        );
    }

    let Some(token) = state.pool.select_next() else {
        state.counters.error();
        warn!("no upstream token available");
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no_token_available",
            "no upstream token available, add entries via the admin API",
            request_id,
        );
    };

    let method = request.method().clone();
    let upstream_url = match request.uri().path_and_query() {
        Some(pq) => format!("{}{}", state.base_url.trim_end_matches('/'), pq),
        None => state.base_url.clone(),
    };

    // Collect request headers: hop-by-hop, host and client credentials are dropped
    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in request.headers() {
        if !is_hop_by_hop(name.as_str()) && !is_replaced(name.as_str()) {
            headers.insert(name.clone(), value.clone());
        }
    }
    let bearer = match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(v) => v,
        Err(e) => {
            state.counters.error();
            error!(error = %e, "pool token is not a valid header value");
            state.pool.mark_failed(&token);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "proxy_error",
                "selected token is not a valid header value",
                request_id,
            );
        }
    };
    headers.insert(reqwest::header::AUTHORIZATION, bearer);

    let body_bytes = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            state.counters.error();
            error!(error = %e, "failed to read request body");
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                &format!("invalid request body: {e}"),
                request_id,
            );
        }
    };

    let sent = state
        .client
        .request(method, &upstream_url)
        .headers(headers)
        .timeout(state.timeout)
        .body(body_bytes)
        .send()
        .await;

    let upstream_response = match sent {
        Ok(r) => r,
        Err(e) => {
            state.counters.error();
            // Network trouble says nothing about the token; pool is left alone
            if e.is_timeout() {
                metrics::record_upstream_error("timeout");
                error!(error = %e, "upstream timeout");
                return error_response(
                    StatusCode::GATEWAY_TIMEOUT,
                    "proxy_error",
                    &format!("upstream timeout after {}s", state.timeout.as_secs()),
                    request_id,
                );
            }
            let error_type = if e.is_connect() { "connection" } else { "other" };
            metrics::record_upstream_error(error_type);
            error!(error = %e, "upstream request failed");
            return error_response(
                StatusCode::BAD_GATEWAY,
                "proxy_error",
                &format!("upstream error: {e}"),
                request_id,
            );
        }
    };

    let status = upstream_response.status();
    let outcome = classify_status(status.as_u16());
    if outcome == Outcome::Rejected {
        warn!(
            status = status.as_u16(),
            outcome = outcome.label(),
            "upstream rejected pool token"
        );
    }
    state.pool.report(&token, outcome);

    let mut response = Response::builder().status(status);
    for (name, value) in upstream_response.headers() {
        if !is_hop_by_hop(name.as_str()) {
            response = response.header(name, value);
        }
    }
    let stream = upstream_response
        .bytes_stream()
        .inspect_err(|e| warn!(error = %e, "upstream stream interrupted"));
    response
        .body(Body::from_stream(stream))
        .unwrap_or_else(|e| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "proxy_error",
                &format!("response build error: {e}"),
                request_id,
            )
        })
}

/// Whether the request carries `Authorization: Bearer <api_key>`.
fn is_authorized(headers: &HeaderMap, api_key: &Secret<String>) -> bool {
    let Some(value) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some((scheme, credentials)) = value.trim().split_once(' ') else {
        return false;
    };
    scheme.eq_ignore_ascii_case("bearer")
        && !api_key.expose().is_empty()
        && credentials.trim() == api_key.expose().as_str()
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Headers the forwarder sets itself.
fn is_replaced(name: &str) -> bool {
    ["host", "authorization", "content-length"]
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
