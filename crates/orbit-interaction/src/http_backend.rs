//! HTTP adapter for the pluggable service backends.
//!
//! Web-scraping, browser-automation, code-hosting and IDE servers all speak
//! the same small protocol:
//!
//! - `GET  {endpoint}/health` answers 2xx when the server is ready
//! - `POST {endpoint}/operations/{operation-type}` takes the parameter map as
//!   a JSON body and returns either an envelope
//!   `{"success": bool, "output"?: string, "error"?: string, "data"?: any}`
//!   or any other JSON value, which is treated as a successful payload.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use orbit_core::backend::{BackendAdapter, BackendId, ConnectionState, DispatchContext};
use orbit_core::error::{OrbitError, Result};
use orbit_core::operation::{OperationOutput, OperationRequest};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpServiceBackend {
    id: BackendId,
    endpoint: String,
    client: Client,
    state: RwLock<ConnectionState>,
}

impl HttpServiceBackend {
    pub fn new(id: BackendId, endpoint: impl Into<String>) -> Self {
        Self::with_client(id, endpoint, Client::new())
    }

    pub fn with_client(id: BackendId, endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            id,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
            state: RwLock::new(ConnectionState::Unknown),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Probes the health route and records the result.
    pub async fn probe(&self) -> ConnectionState {
        let url = format!("{}/health", self.endpoint);
        let next = match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => ConnectionState::Connected,
            Ok(response) => {
                tracing::warn!(
                    "[HttpBackend] {} health check returned {}",
                    self.id,
                    response.status()
                );
                ConnectionState::Disconnected
            }
            Err(e) => {
                tracing::warn!("[HttpBackend] {} unreachable at {}: {}", self.id, url, e);
                ConnectionState::Disconnected
            }
        };
        *self.state.write().await = next;
        next
    }

    async fn mark_disconnected(&self) {
        *self.state.write().await = ConnectionState::Disconnected;
    }
}

/// Interprets a 2xx response body.
fn parse_body(body: &str, duration_ms: u64) -> OperationOutput {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return OperationOutput::success(body, duration_ms);
    };

    if let Some(success) = value.get("success").and_then(Value::as_bool) {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let mut output = if success {
            OperationOutput::success(text("output").unwrap_or_default(), duration_ms)
        } else {
            let mut failed = OperationOutput::failure(
                text("error").unwrap_or_else(|| "service reported failure".to_string()),
                duration_ms,
            );
            failed.output = text("output").unwrap_or_default();
            failed
        };
        if let Some(data) = value.get("data").filter(|d| !d.is_null()) {
            output = output.with_data(data.clone());
        }
        return output;
    }

    let text = match &value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    OperationOutput::success(text, duration_ms).with_data(value)
}

#[async_trait]
impl BackendAdapter for HttpServiceBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.state().await == ConnectionState::Connected {
            return Ok(());
        }
        match self.probe().await {
            ConnectionState::Connected => Ok(()),
            _ => Err(OrbitError::unavailable(
                self.id.to_string(),
                format!("no healthy server at {}", self.endpoint),
            )),
        }
    }

    async fn dispatch(
        &self,
        request: OperationRequest,
        ctx: DispatchContext,
    ) -> Result<OperationOutput> {
        request.validate()?;
        let url = format!("{}/operations/{}", self.endpoint, request.operation_type);
        let started = Instant::now();

        tracing::debug!(
            operation_id = %ctx.operation_id,
            backend = %self.id,
            "[HttpBackend] POST {}",
            url
        );

        let call = async {
            let response = self
                .client
                .post(&url)
                .json(&request.parameters)
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = tokio::select! {
            result = call => match result {
                Ok(pair) => pair,
                Err(e) if e.is_connect() => {
                    self.mark_disconnected().await;
                    return Err(OrbitError::unavailable(self.id.to_string(), e.to_string()));
                }
                Err(e) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    return Ok(OperationOutput::failure(
                        format!("request failed: {e}"),
                        duration_ms,
                    ));
                }
            },
            _ = ctx.cancel.cancelled() => {
                return Err(OrbitError::Cancelled { operation_id: ctx.operation_id.clone() });
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if status.is_success() {
            Ok(parse_body(&body, duration_ms))
        } else {
            let detail = if body.trim().is_empty() {
                status.to_string()
            } else {
                format!("{status}: {}", body.trim())
            };
            Ok(OperationOutput::failure(
                format!("{} error ({detail})", self.id),
                duration_ms,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_failure_keeps_error() {
        let out = parse_body(r#"{"success": false, "error": "element not found"}"#, 12);
        assert!(!out.success);
        assert_eq!(out.error.as_deref(), Some("element not found"));
        assert_eq!(out.duration_ms, 12);
    }

    #[test]
    fn test_envelope_success_carries_data() {
        let out = parse_body(
            r#"{"success": true, "output": "2 issues", "data": [{"line": 3}]}"#,
            5,
        );
        assert!(out.success);
        assert_eq!(out.output, "2 issues");
        assert_eq!(out.data, Some(json!([{"line": 3}])));
    }

    #[test]
    fn test_plain_json_is_payload() {
        let out = parse_body(r#"{"items": [1, 2]}"#, 1);
        assert!(out.success);
        assert_eq!(out.data, Some(json!({"items": [1, 2]})));
    }

    #[test]
    fn test_non_json_is_text() {
        let out = parse_body("<html>page</html>", 1);
        assert!(out.success);
        assert_eq!(out.output, "<html>page</html>");
        assert!(out.data.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let client = Client::builder().no_proxy().build().unwrap();
        let backend =
            HttpServiceBackend::with_client(BackendId::WebScraper, "http://127.0.0.1:9/", client);
        assert_eq!(backend.endpoint(), "http://127.0.0.1:9");
        let err = backend.ensure_connected().await.unwrap_err();
        assert!(err.is_availability());
        assert_eq!(backend.state().await, ConnectionState::Disconnected);
    }
}
