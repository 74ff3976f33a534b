//! Test Helper Functions and Utilities
//!
//! Builds the full HTTP app from an [`AppConfig`] the same way `main` does, and drives it
//! in-process with `tower::ServiceExt::oneshot`.

use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use serde_json::{json, Value};
use server::{create_app, AppState, CoreServices};
use std::{collections::HashMap, sync::Arc};
use tower::ServiceExt;
use walletgate_core::{
    audit::{AuditEvent, AuditSink},
    backend::Backend,
    config::AppConfig,
};

pub const AUTH_HEADER: &str = "X-Lbry-Auth-Token";

/// Configuration pointing at `urls`, with static tokens and metrics off.
#[must_use]
pub fn config_for(urls: &[&str]) -> AppConfig {
    let mut config = AppConfig::default();
    config.backends.servers =
        urls.iter().enumerate().map(|(i, url)| Backend::new(format!("sdk-{i}"), *url)).collect();
    config.auth.static_tokens = HashMap::from([
        ("alice-token".to_string(), 7),
        ("bob-token".to_string(), 8),
    ]);
    config.hooks.enabled = Vec::new();
    config.metrics.enabled = false;
    config
}

/// A built app plus the services behind it.
pub struct TestApp {
    pub router: Router,
    pub services: CoreServices,
}

impl TestApp {
    /// # Panics
    ///
    /// Panics if the configuration is rejected.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self::with_audit(config, Arc::new(walletgate_core::audit::TracingAuditSink))
    }

    /// # Panics
    ///
    /// Panics if the configuration is rejected.
    #[must_use]
    pub fn with_audit(config: &AppConfig, sink: Arc<dyn AuditSink>) -> Self {
        config.validate().expect("test configuration must be valid");
        let services = CoreServices::build_with_audit(config, sink).expect("services build");
        let state = AppState::new(
            Arc::clone(&services.service),
            &config.auth.token_header,
            config.server.max_body_bytes,
        );
        Self { router: create_app(state, &config.server), services }
    }

    /// Sends one request through the full middleware stack.
    ///
    /// # Panics
    ///
    /// Panics if the router itself fails, which it never should.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("router is infallible")
    }

    /// POSTs `body` to `/` and returns the decoded JSON-RPC response.
    pub async fn rpc(&self, body: &Value, token: Option<&str>) -> Value {
        let response = self.send(rpc_post(body, token)).await;
        json_body(response).await
    }
}

/// Builds a JSON-RPC request body.
#[must_use]
pub fn rpc_body(method: &str, params: &Value, id: impl Into<Value>) -> Value {
    json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": id.into() })
}

/// Builds a POST to `/` with an optional auth token.
///
/// # Panics
///
/// Panics if the request cannot be built.
#[must_use]
pub fn rpc_post(body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder =
        Request::builder().method("POST").uri("/").header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTH_HEADER, token);
    }
    builder.body(Body::from(body.to_string())).expect("valid request")
}

/// # Panics
///
/// Panics if the body is not JSON.
pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

/// Audit sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: std::sync::Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_for_is_valid() {
        let config = config_for(&["http://127.0.0.1:5280", "http://127.0.0.1:5281"]);
        assert!(config.validate().is_ok());
        assert_eq!(config.backends.servers[1].name, "sdk-1");
    }

    #[test]
    fn test_rpc_body_shape() {
        let body = rpc_body("resolve", &json!({"urls": ["lbry://one"]}), 3);
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["method"], "resolve");
        assert_eq!(body["id"], 3);
    }
}
