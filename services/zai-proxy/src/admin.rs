//! Admin API for pool management
//!
//! Runs on a separate listener (default 127.0.0.1:9090). Listings never
//! expose full tokens or passwords, only previews.
//!
//! Endpoints:
//! - GET    /admin/tokens         list entries with status
//! - PUT    /admin/tokens         replace the entry list and persist it
//! - DELETE /admin/tokens         clear the pool and persist the empty list
//! - POST   /admin/tokens/test    probe a single token
//! - POST   /admin/tokens/refresh run a batch refresh now
//! - POST   /admin/tokens/reload  re-read the entries file
//! - GET    /admin/pool           pool health summary

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde::Deserialize;
use tracing::{info, warn};

use token_pool::{Pool, batch_refresh, extract_token};
use zai_auth::{EntryFile, token_preview};

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    pool: Arc<Pool>,
    entry_file: Option<Arc<EntryFile>>,
    max_concurrent: usize,
}

impl AdminState {
    pub fn new(pool: Arc<Pool>, entry_file: Option<Arc<EntryFile>>, max_concurrent: usize) -> Self {
        Self {
            pool,
            entry_file,
            max_concurrent,
        }
    }

    /// Write the current entry list to the entries file, if one is configured.
    ///
    /// Returns whether anything was written. A failed write is logged; the
    /// in-memory pool stays authoritative.
    async fn persist(&self) -> bool {
        let Some(file) = &self.entry_file else {
            return false;
        };
        match file.save(&self.pool.entries()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %file.path().display(), error = %e, "failed to persist entries");
                false
            }
        }
    }
}

/// Build the admin axum router with all pool management endpoints.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route(
            "/admin/tokens",
            get(list_tokens).put(replace_tokens).delete(clear_tokens),
        )
        .route("/admin/tokens/test", post(test_token))
        .route("/admin/tokens/refresh", post(refresh_tokens))
        .route("/admin/tokens/reload", post(reload_tokens))
        .route("/admin/pool", get(pool_status))
        .with_state(state)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> impl IntoResponse {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// GET /admin/tokens
async fn list_tokens(State(state): State<AdminState>) -> impl IntoResponse {
    let entries = state.pool.listing();
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "count": entries.len(),
            "failed_count": state.pool.failed_count(),
            "entries": entries,
        }),
    )
}

#[derive(Deserialize)]
struct ReplaceRequest {
    entries: Vec<String>,
}

/// PUT /admin/tokens: trims entries, drops blanks, rejects an empty result.
async fn replace_tokens(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<ReplaceRequest>,
) -> impl IntoResponse {
    let entries: Vec<String> = body
        .entries
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect();

    if entries.is_empty() {
        return json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "entries must contain at least one non-blank entry" }),
        );
    }

    state.pool.replace(entries);
    let persisted = state.persist().await;
    info!(entries = state.pool.len(), persisted, "pool entries replaced");

    json_response(
        StatusCode::OK,
        serde_json::json!({
            "count": state.pool.len(),
            "persisted": persisted,
        }),
    )
}

/// DELETE /admin/tokens
async fn clear_tokens(State(state): State<AdminState>) -> impl IntoResponse {
    state.pool.replace(Vec::new());
    let persisted = state.persist().await;
    info!(persisted, "pool entries cleared");

    json_response(
        StatusCode::OK,
        serde_json::json!({
            "count": 0,
            "persisted": persisted,
        }),
    )
}

#[derive(Deserialize)]
struct TestRequest {
    token: String,
}

/// POST /admin/tokens/test: accepts a bare token or a raw entry.
async fn test_token(
    State(state): State<AdminState>,
    axum::Json(body): axum::Json<TestRequest>,
) -> impl IntoResponse {
    let raw = body.token.trim();
    if raw.is_empty() {
        return json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "token must not be empty" }),
        );
    }

    let token = extract_token(raw);
    let valid = state.pool.upstream().probe(token).await;
    info!(token = %token_preview(token), valid, "token tested");

    json_response(
        StatusCode::OK,
        serde_json::json!({
            "valid": valid,
            "token_preview": token_preview(token),
        }),
    )
}

/// POST /admin/tokens/refresh
async fn refresh_tokens(State(state): State<AdminState>) -> impl IntoResponse {
    let report = batch_refresh(&state.pool, state.max_concurrent).await;
    let persisted = report.changed() && state.persist().await;

    let mut body = serde_json::to_value(&report).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(map) = body.as_object_mut() {
        map.insert("persisted".to_string(), serde_json::Value::Bool(persisted));
    }
    json_response(StatusCode::OK, body)
}

/// POST /admin/tokens/reload
async fn reload_tokens(State(state): State<AdminState>) -> impl IntoResponse {
    let Some(file) = &state.entry_file else {
        return json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "no entries file configured" }),
        );
    };

    match file.load().await {
        Ok(entries) => {
            let count = entries.len();
            state.pool.replace(entries);
            info!(path = %file.path().display(), entries = count, "pool reloaded from file");
            json_response(StatusCode::OK, serde_json::json!({ "count": count }))
        }
        Err(e) => {
            warn!(path = %file.path().display(), error = %e, "reload failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": format!("failed to load entries: {e}") }),
            )
        }
    }
}

/// GET /admin/pool
async fn pool_status(State(state): State<AdminState>) -> impl IntoResponse {
    json_response(StatusCode::OK, state.pool.health())
}
