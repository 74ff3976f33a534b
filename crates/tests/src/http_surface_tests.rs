//! CORS, health and metrics endpoints of the assembled server.

use crate::mock_infrastructure::{
    config_for, json_body, rpc_body, rpc_post, CountingBackend, SdkMockBuilder, TestApp,
};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::json;
use serial_test::serial;
use server::router::CORS_MAX_AGE;
use walletgate_core::{cache::CacheRule, types::MethodMatcher};

#[tokio::test]
async fn test_cors_preflight_never_touches_the_backend() {
    let backend = CountingBackend::start("sdk-a").await;
    let app = TestApp::new(&config_for(&[backend.url()]));

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/")
        .header("origin", "https://odysee.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "x-lbry-auth-token, content-type")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["access-control-max-age"], CORS_MAX_AGE);
    assert_eq!(
        response.headers()["access-control-allow-headers"],
        "X-Lbry-Auth-Token, Origin, X-Requested-With, Content-Type, Accept"
    );
    assert!(to_bytes(response.into_body(), usize::MAX).await.unwrap().is_empty());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_cors_preflight_allows_the_configured_token_header() {
    let backend = CountingBackend::start("sdk-a").await;
    let mut config = config_for(&[backend.url()]);
    config.auth.token_header = "X-Wallet-Token".to_string();
    let app = TestApp::new(&config);

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/")
        .header("access-control-request-headers", "x-wallet-token")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    let allowed = response.headers()["access-control-allow-headers"].to_str().unwrap();
    assert!(allowed.starts_with("X-Wallet-Token, "), "got {allowed}");
    assert!(!allowed.contains("X-Lbry-Auth-Token"));
    assert!(allowed.contains("Content-Type"));
}

#[tokio::test]
async fn test_rpc_responses_carry_cors_and_cache_headers() {
    let backend = CountingBackend::start("sdk-a").await;
    let app = TestApp::new(&config_for(&[backend.url()]));

    let response = app.send(rpc_post(&rpc_body("status", &json!({}), 1), None)).await;
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["x-cache-status"], "MISS");
    assert!(headers.contains_key("x-request-id"));

    // errors travel the same way
    let response = app.send(rpc_post(&rpc_body("wallet_balance", &json!({}), 2), None)).await;
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["x-cache-status"], "BYPASS");
}

#[tokio::test]
async fn test_client_request_id_is_echoed() {
    let backend = CountingBackend::start("sdk-a").await;
    let app = TestApp::new(&config_for(&[backend.url()]));

    let mut request = rpc_post(&rpc_body("status", &json!({}), 1), None);
    request.headers_mut().insert("x-request-id", "trace-me-123".parse().unwrap());
    let response = app.send(request).await;

    assert_eq!(response.headers()["x-request-id"], "trace-me-123");
}

#[tokio::test]
async fn test_health_reports_pool_and_cache() {
    let backend = CountingBackend::start("sdk-a").await;
    let app = TestApp::new(&config_for(&[backend.url()]));
    app.rpc(&rpc_body("wallet_balance", &json!({}), 1), Some("alice-token")).await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backends"]["total"], 1);
    assert_eq!(body["backends"]["bound_users"], 1);
    assert_eq!(body["cache"]["entries"], 1);
    assert!(body["timestamp"].is_string());

    app.services.registry.replace_backends(Vec::new());
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_disabled() {
    let app = TestApp::new(&config_for(&["http://127.0.0.1:5280"]));
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[serial]
async fn test_metrics_cover_calls_failures_cache_and_auth() {
    let mut sdk = SdkMockBuilder::new().await;
    sdk.mock_method("surface_call_ok", &json!({"ok": true})).await;
    sdk.mock_rpc_error("surface_call_rpc", -32500, "nope").await;

    let mut config = config_for(&[sdk.url().as_str()]);
    config.metrics.enabled = true;
    config.cache.rules.insert(MethodMatcher::exact("surface_call_ok"), CacheRule::global(30));
    let app = TestApp::new(&config);

    app.rpc(&rpc_body("surface_call_ok", &json!({}), 1), None).await;
    app.rpc(&rpc_body("surface_call_ok", &json!({}), 2), None).await;
    app.rpc(&rpc_body("surface_call_rpc", &json!({}), 3), None).await;
    app.rpc(&rpc_body("wallet_balance", &json!({}), 4), None).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let lines_for = |metric: &str, method: &str| {
        text.lines()
            .filter(|l| l.starts_with(metric) && l.contains(&format!("method=\"{method}\"")))
            .count()
    };
    assert!(lines_for("walletgate_call_duration_seconds", "surface_call_ok") > 0);
    assert!(lines_for("walletgate_cache_hits_total", "surface_call_ok") > 0);
    assert!(lines_for("walletgate_cache_misses_total", "surface_call_ok") > 0);
    assert!(text
        .lines()
        .any(|l| l.starts_with("walletgate_call_failed_duration_seconds") &&
            l.contains("surface_call_rpc") &&
            l.contains("kind=\"rpc\"")));
    assert!(text.contains("walletgate_auth_results_total"));
    assert!(text.contains("walletgate_backends"));
}
