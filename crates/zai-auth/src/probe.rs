//! Active token health probe
//!
//! Sends one minimal streaming chat completion with the token as bearer.
//! Exactly HTTP 200 is healthy. Every other status and every transport fault
//! is unhealthy; neither is propagated. The response body is never read.

use reqwest::StatusCode;
use tracing::debug;

use crate::constants::{FRONTEND_VERSION, USER_AGENT};
use crate::error::{Error, Result};
use crate::token_preview;
use crate::upstream::Upstream;

impl Upstream {
    /// Check whether `token` is currently accepted by the chat endpoint.
    pub async fn probe(&self, token: &str) -> bool {
        match self.send_probe(token).await {
            Ok(StatusCode::OK) => {
                debug!(token = %token_preview(token), "health probe passed");
                true
            }
            Ok(status) => {
                debug!(
                    token = %token_preview(token),
                    status = status.as_u16(),
                    "health probe rejected"
                );
                false
            }
            Err(e) => {
                debug!(token = %token_preview(token), error = %e, "health probe failed");
                false
            }
        }
    }

    async fn send_probe(&self, token: &str) -> Result<StatusCode> {
        let response = self
            .client
            .post(self.config.chat_url())
            .timeout(self.config.probe_timeout)
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .header("x-fe-version", FRONTEND_VERSION)
            .json(&probe_payload(&self.config.model))
            .send()
            .await
            .map_err(|e| Error::Http(format!("probe request failed: {e}")))?;
        Ok(response.status())
    }
}

/// Smallest request the chat endpoint accepts: one user message, all
/// optional features off, fresh chat/message ids.
fn probe_payload(model: &str) -> serde_json::Value {
    serde_json::json!({
        "stream": true,
        "model": model,
        "messages": [{"role": "user", "content": "hi"}],
        "background_tasks": {
            "title_generation": false,
            "tags_generation": false
        },
        "chat_id": uuid::Uuid::new_v4().to_string(),
        "id": uuid::Uuid::new_v4().to_string(),
        "features": {
            "image_generation": false,
            "code_interpreter": false,
            "web_search": false,
            "auto_web_search": false
        },
        "mcp_servers": [],
        "params": {},
        "tool_servers": []
    })
}
