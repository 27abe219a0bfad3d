//! Z.AI token pool proxy
//!
//! Forwards chat traffic to the upstream with a bearer token taken from a
//! rotating pool, marks rejected tokens failed, and keeps the pool healthy
//! with background probe and refresh loops. A separate admin listener manages
//! the entry list.

mod admin;
mod config;
mod metrics;
mod proxy;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;
use token_pool::{EntrySink, Pool, Scheduler};
use zai_auth::{EntryFile, Upstream};

use crate::admin::AdminState;
use crate::config::Config;
use crate::proxy::{ForwardCounters, ProxyState};

/// How long in-flight requests may drain after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    prometheus: PrometheusHandle,
}

/// Build the forwarder router: health, metrics, and a catch-all proxy route.
///
/// `max_connections` bounds concurrently served requests; excess requests queue.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(proxy_handler)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting zai-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder()?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        admin_addr = %config.server.admin_addr,
        base_url = %config.upstream.base_url,
        entries = config.pool.entries.len(),
        source = config.pool.source.label(),
        refresh_enabled = config.refresh.enabled,
        "configuration loaded"
    );

    let upstream = Upstream::new(config.upstream.to_upstream_config())
        .context("failed to build upstream HTTP client")?;
    let client = upstream.client().clone();

    let pool = Arc::new(Pool::new(config.pool.entries.clone(), upstream));
    if pool.is_empty() {
        warn!("token pool is empty, requests will get 503 until entries are added");
    }

    let entry_file = config
        .pool
        .entries_file
        .clone()
        .map(|path| Arc::new(EntryFile::new(path)));
    let sink = entry_file
        .clone()
        .map(|file| file as Arc<dyn EntrySink>);

    let scheduler = Scheduler::spawn(
        pool.clone(),
        config.health.schedule(),
        config.refresh.schedule(),
        sink,
    );

    let app_state = AppState {
        proxy: ProxyState {
            pool: pool.clone(),
            client,
            base_url: config.upstream.base_url.clone(),
            timeout: Duration::from_secs(config.server.timeout_secs),
            api_key: Arc::new(config.server.api_key.clone()),
            counters: ForwardCounters::new(),
        },
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);
    let admin_app = admin::build_admin_router(AdminState::new(
        pool.clone(),
        entry_file,
        config.refresh.max_concurrent,
    ));

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;
    let admin_listener = TcpListener::bind(config.server.admin_addr)
        .await
        .with_context(|| format!("failed to bind admin API to {}", config.server.admin_addr))?;

    info!(
        addr = %config.server.listen_addr,
        admin_addr = %config.server.admin_addr,
        entries = pool.len(),
        "accepting requests"
    );

    // Both servers drain on the same signal. The drain timeout starts when the
    // signal fires, not when the servers start.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut proxy_rx = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = proxy_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    let mut admin_rx = shutdown_rx;
    let admin_handle = tokio::spawn(async move {
        axum::serve(admin_listener, admin_app)
            .with_graceful_shutdown(async move {
                let _ = admin_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        (server_handle.await, admin_handle.await)
    })
    .await;

    match drained {
        Ok((proxy_result, admin_result)) => {
            for (name, result) in [("proxy", proxy_result), ("admin", admin_result)] {
                match result {
                    Ok(Ok(())) => info!(server = name, "server drained"),
                    Ok(Err(e)) => error!(server = name, error = %e, "server error during shutdown"),
                    Err(e) => error!(server = name, error = %e, "server task panicked"),
                }
            }
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    scheduler.shutdown().await;

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: pool summary plus uptime and request counters.
/// Returns 200 while at least one entry is usable, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let counters = &state.proxy.counters;
    let uptime = counters.started_at.elapsed().as_secs();
    let requests = counters.requests_total.load(Ordering::Relaxed);
    let errors = counters.errors_total.load(Ordering::Relaxed);

    let pool = state.proxy.pool.health();
    let status = pool["status"].clone();
    let status_code = if status == "unhealthy" {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    } else {
        axum::http::StatusCode::OK
    };

    let body = serde_json::json!({
        "status": status,
        "pool": pool,
        "uptime_seconds": uptime,
        "requests_served": requests,
        "errors_total": errors,
    });

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Catch-all handler that forwards every non-health request upstream.
async fn proxy_handler(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    proxy::proxy_request(&state.proxy, request, request_id).await
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
///
/// A handler that cannot be installed is logged and never fires; the other
/// signal still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::Secret;
    use tower::ServiceExt;
    use zai_auth::UpstreamConfig;

    const TEST_API_KEY: &str = "sk-test-key";

    /// GET request carrying the service API key.
    fn authed_get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {TEST_API_KEY}"))
            .body(Body::empty())
            .unwrap()
    }

    /// Create a PrometheusHandle for tests without installing a global recorder.
    fn test_prometheus_handle() -> PrometheusHandle {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        recorder.handle()
    }

    fn test_pool(entries: &[&str], upstream_url: &str) -> Arc<Pool> {
        let upstream = Upstream::new(UpstreamConfig::with_base_url(upstream_url)).unwrap();
        Arc::new(Pool::new(
            entries.iter().map(|e| e.to_string()).collect(),
            upstream,
        ))
    }

    fn test_app_state(pool: Arc<Pool>, upstream_url: &str, timeout: Duration) -> AppState {
        AppState {
            proxy: ProxyState {
                pool,
                client: reqwest::Client::new(),
                base_url: upstream_url.to_string(),
                timeout,
                api_key: Arc::new(Secret::from(TEST_API_KEY)),
                counters: ForwardCounters::new(),
            },
            prometheus: test_prometheus_handle(),
        }
    }

    /// Mock upstream that echoes request details as JSON.
    ///
    /// Requests carrying "Bearer revoked" get a 401, "Bearer limited" a 429.
    async fn start_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            let app =
                axum::Router::new().fallback(|request: axum::http::Request<Body>| async move {
                    let mut headers_map = serde_json::Map::new();
                    for (name, value) in request.headers() {
                        headers_map.insert(
                            name.to_string(),
                            serde_json::Value::String(value.to_str().unwrap_or("").to_string()),
                        );
                    }
                    let status = match headers_map
                        .get("authorization")
                        .and_then(|v| v.as_str())
                    {
                        Some("Bearer revoked") => StatusCode::UNAUTHORIZED,
                        Some("Bearer limited") => StatusCode::TOO_MANY_REQUESTS,
                        _ => StatusCode::OK,
                    };
                    let method = request.method().to_string();
                    let path = request.uri().path().to_string();
                    let query = request.uri().query().unwrap_or("").to_string();
                    let body_bytes = axum::body::to_bytes(request.into_body(), 10 * 1024 * 1024)
                        .await
                        .unwrap();
                    let body = serde_json::json!({
                        "echoed_headers": headers_map,
                        "method": method,
                        "path": path,
                        "query": query,
                        "body": String::from_utf8_lossy(&body_bytes),
                    });
                    (status, [("x-upstream-echo", "true")], axum::Json(body))
                });
            axum::serve(listener, app).await.unwrap();
        });

        url
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_reports_pool_status() {
        let pool = test_pool(&["t1", "t2"], "http://127.0.0.1:1");
        pool.mark_failed("t1");
        let state = test_app_state(pool, "http://127.0.0.1:1", Duration::from_secs(5));
        state.proxy.counters.requests_total.fetch_add(3, Ordering::Relaxed);

        let app = build_router(state, 1000);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["pool"]["entries_total"], 2);
        assert_eq!(json["pool"]["entries_failed"], 1);
        assert_eq!(json["requests_served"], 3);
        assert!(json["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn health_endpoint_returns_503_for_empty_pool() {
        let pool = test_pool(&[], "http://127.0.0.1:1");
        let app = build_router(
            test_app_state(pool, "http://127.0.0.1:1", Duration::from_secs(5)),
            1000,
        );

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["status"], "unhealthy");
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let pool = test_pool(&["t1"], "http://127.0.0.1:1");
        let app = build_router(
            test_app_state(pool, "http://127.0.0.1:1", Duration::from_secs(5)),
            1000,
        );

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn proxy_injects_pool_token_and_replaces_client_auth() {
        let url = start_echo_server().await;
        let pool = test_pool(&["u@x.com----pw----pooltoken"], &url);
        let app = build_router(test_app_state(pool, &url, Duration::from_secs(5)), 1000);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat/completions?stream=true")
                    .header("authorization", format!("Bearer {TEST_API_KEY}"))
                    .header("content-type", "application/json")
                    .header("connection", "keep-alive")
                    .body(Body::from(r#"{"messages":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-upstream-echo").unwrap(), "true");
        let json = body_json(response).await;
        assert_eq!(json["echoed_headers"]["authorization"], "Bearer pooltoken");
        assert_eq!(json["echoed_headers"]["content-type"], "application/json");
        assert!(json["echoed_headers"].get("connection").is_none());
        assert_eq!(json["method"], "POST");
        assert_eq!(json["path"], "/api/chat/completions");
        assert_eq!(json["query"], "stream=true");
        assert_eq!(json["body"], r#"{"messages":[]}"#);
    }

    #[tokio::test]
    async fn proxy_rotates_through_pool() {
        let url = start_echo_server().await;
        let pool = test_pool(&["a@x.com----pw----t1", "bareTok2"], &url);
        let state = test_app_state(pool, &url, Duration::from_secs(5));

        let mut seen = Vec::new();
        for _ in 0..3 {
            let app = build_router(state.clone(), 1000);
            let response = app
                .oneshot(authed_get("/v1/models"))
                .await
                .unwrap();
            let json = body_json(response).await;
            seen.push(json["echoed_headers"]["authorization"].as_str().unwrap().to_string());
        }

        assert_eq!(seen, vec!["Bearer t1", "Bearer bareTok2", "Bearer t1"]);
    }

    #[tokio::test]
    async fn proxy_rejects_missing_api_key_without_spending_a_token() {
        let url = start_echo_server().await;
        let pool = test_pool(&["u@x.com----pw----secretpooltoken", "t2"], &url);
        let state = test_app_state(pool.clone(), &url, Duration::from_secs(5));
        let errors = state.proxy.counters.errors_total.clone();

        let response = build_router(state, 1000)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat/completions")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "authentication_error");
        assert!(!json.to_string().contains("secretpooltoken"));
        assert_eq!(pool.cursor(), 0);
        assert_eq!(errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn proxy_rejects_wrong_api_key() {
        let url = start_echo_server().await;
        let pool = test_pool(&["t1", "t2"], &url);
        let app = build_router(test_app_state(pool.clone(), &url, Duration::from_secs(5)), 1000);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/chat")
                    .header("authorization", "Bearer sk-wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["type"], "authentication_error");
        assert_eq!(pool.cursor(), 0);
        assert_eq!(pool.failed_count(), 0);
    }

    #[tokio::test]
    async fn proxy_accepts_correct_api_key_and_swaps_in_pool_token() {
        let url = start_echo_server().await;
        let pool = test_pool(&["t1", "t2"], &url);
        let app = build_router(test_app_state(pool.clone(), &url, Duration::from_secs(5)), 1000);

        let response = app.oneshot(authed_get("/v1/chat")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["echoed_headers"]["authorization"], "Bearer t1");
        assert!(!json.to_string().contains(TEST_API_KEY));
        assert_eq!(pool.cursor(), 1);
    }

    #[tokio::test]
    async fn proxy_returns_503_when_pool_empty() {
        let url = start_echo_server().await;
        let pool = test_pool(&[], &url);
        let state = test_app_state(pool, &url, Duration::from_secs(5));
        let errors = state.proxy.counters.errors_total.clone();
        let app = build_router(state, 1000);

        let response = app
            .oneshot(authed_get("/v1/chat"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "no_token_available");
        assert!(json["error"]["request_id"].as_str().unwrap().starts_with("req_"));
        assert_eq!(errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn proxy_marks_rejected_token_failed_and_passes_status_through() {
        let url = start_echo_server().await;
        let pool = test_pool(&["revoked", "good"], &url);
        let state = test_app_state(pool.clone(), &url, Duration::from_secs(5));

        let response = build_router(state.clone(), 1000)
            .oneshot(authed_get("/v1/chat"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(pool.failed_entries(), vec!["revoked"]);

        // The failed entry is skipped on subsequent selections
        for _ in 0..2 {
            let response = build_router(state.clone(), 1000)
                .oneshot(authed_get("/v1/chat"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["echoed_headers"]["authorization"], "Bearer good");
        }
    }

    #[tokio::test]
    async fn proxy_treats_rate_limit_as_rejection() {
        let url = start_echo_server().await;
        let pool = test_pool(&["limited", "good"], &url);
        let app = build_router(test_app_state(pool.clone(), &url, Duration::from_secs(5)), 1000);

        let response = app
            .oneshot(authed_get("/v1/chat"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(pool.failed_count(), 1);
    }

    #[tokio::test]
    async fn proxy_serves_again_after_every_entry_failed() {
        let url = start_echo_server().await;
        let pool = test_pool(&["good"], &url);
        pool.mark_failed("good");
        let app = build_router(test_app_state(pool.clone(), &url, Duration::from_secs(5)), 1000);

        // Single failed entry: selection resets and hands it out again
        let response = app
            .oneshot(authed_get("/v1/chat"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(pool.failed_count(), 0);
    }

    #[tokio::test]
    async fn proxy_returns_502_for_dead_upstream() {
        let pool = test_pool(&["t1"], "http://127.0.0.1:1");
        let app = build_router(
            test_app_state(pool.clone(), "http://127.0.0.1:1", Duration::from_secs(5)),
            1000,
        );

        let response = app
            .oneshot(authed_get("/v1/chat"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "proxy_error");
        // Transport errors are not the token's fault
        assert_eq!(pool.failed_count(), 0);
    }

    #[tokio::test]
    async fn proxy_timeout_returns_504_gateway_timeout() {
        // Server that accepts connections but never responds
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_url = format!("http://{}", listener.local_addr().unwrap());

        let _server = tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    drop(socket);
                });
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let pool = test_pool(&["t1"], &upstream_url);
        let app = build_router(
            test_app_state(pool.clone(), &upstream_url, Duration::from_millis(50)),
            1000,
        );

        let response = app
            .oneshot(authed_get("/v1/timeout"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "proxy_error");
        assert!(json["error"]["message"].as_str().unwrap().contains("timeout"));
        assert_eq!(pool.failed_count(), 0);
    }

    #[tokio::test]
    async fn concurrency_limit_queues_excess_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_url = format!("http://{}", listener.local_addr().unwrap());

        // Slow upstream: holds each request for 300ms
        let _server = tokio::spawn(async move {
            let app = axum::Router::new().fallback(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                (StatusCode::OK, "slow")
            });
            axum::serve(listener, app).await.unwrap();
        });

        let pool = test_pool(&["t1"], &upstream_url);
        let app = build_router(
            test_app_state(pool, &upstream_url, Duration::from_secs(5)),
            1,
        );

        let test_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let test_url = format!("http://{}", test_listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(test_listener, app).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let (r1, r2) = tokio::join!(
            client
                .get(format!("{test_url}/slow1"))
                .bearer_auth(TEST_API_KEY)
                .send(),
            client
                .get(format!("{test_url}/slow2"))
                .bearer_auth(TEST_API_KEY)
                .send()
        );
        let s1 = r1.unwrap().status();
        let s2 = r2.unwrap().status();
        assert!(
            s1.is_success() && s2.is_success(),
            "both requests should complete (queued, not rejected). s1={s1}, s2={s2}"
        );
    }

    #[tokio::test]
    async fn proxy_rejects_oversized_request_body() {
        let url = start_echo_server().await;
        let pool = test_pool(&["t1"], &url);
        let app = build_router(test_app_state(pool, &url, Duration::from_secs(5)), 1000);

        let oversized = vec![b'x'; 10 * 1024 * 1024 + 1];
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/chat")
                    .header("authorization", format!("Bearer {TEST_API_KEY}"))
                    .body(Body::from(oversized))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["type"], "invalid_request");
    }
}
