//! End-to-end call flow through the HTTP router.
//!
//! Each test builds the app from configuration exactly as the server binary does and talks
//! to mock SDK daemons over real HTTP.

use crate::mock_infrastructure::{
    config_for, json_body, rpc_body, rpc_post, CountingBackend, SdkMockBuilder, TestApp,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;

#[tokio::test]
async fn test_response_id_follows_the_client_on_cache_hits() {
    let backend = CountingBackend::start("sdk-a").await;
    let app = TestApp::new(&config_for(&[backend.url()]));
    let params = json!({"urls": ["lbry://@channel#1/video#2"]});

    let first = app.send(rpc_post(&rpc_body("resolve", &params, "first"), None)).await;
    assert_eq!(first.headers()["x-cache-status"], "MISS");
    let first = json_body(first).await;
    assert_eq!(first["id"], "first");

    let second = app.send(rpc_post(&rpc_body("resolve", &params, 42), None)).await;
    assert_eq!(second.headers()["x-cache-status"], "HIT");
    let second = json_body(second).await;
    assert_eq!(second["id"], 42);
    assert_eq!(second["result"], first["result"]);

    assert_eq!(backend.calls_for("resolve"), 1);
}

#[tokio::test]
async fn test_uncached_methods_always_reach_the_backend() {
    let backend = CountingBackend::start("sdk-a").await;
    let app = TestApp::new(&config_for(&[backend.url()]));

    for id in 0..3 {
        let response = app.send(rpc_post(&rpc_body("blob_list", &json!({}), id), None)).await;
        assert_eq!(response.headers()["x-cache-status"], "BYPASS");
        assert_eq!(json_body(response).await["result"]["call"], id + 1);
    }
    assert_eq!(backend.calls_for("blob_list"), 3);
}

#[tokio::test]
async fn test_backend_rpc_errors_pass_through_and_are_not_cached() {
    let mut sdk = SdkMockBuilder::new().await;
    let mock = sdk
        .get_server()
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(json!({"method": "claim_search"})))
        .with_body(r#"{"jsonrpc":"2.0","error":{"code":-32500,"message":"claim_search failed"},"id":1}"#)
        .expect(2)
        .create_async()
        .await;
    let app = TestApp::new(&config_for(&[sdk.url().as_str()]));

    for id in [10, 11] {
        let body = app.rpc(&rpc_body("claim_search", &json!({"name": "x"}), id), None).await;
        assert_eq!(body["error"]["code"], -32500);
        assert_eq!(body["error"]["message"], "claim_search failed");
        assert_eq!(body["id"], id);
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_backend_does_not_leak_its_address() {
    let app = TestApp::new(&config_for(&["http://127.0.0.1:1"]));

    let response = app.send(rpc_post(&rpc_body("version", &json!({}), 5), None)).await;
    assert_eq!(response.status(), 200);
    let body = json_body(response).await;

    assert_eq!(body["error"]["code"], -32080);
    assert_eq!(body["id"], 5);
    assert!(!body.to_string().contains("127.0.0.1"));
}

#[tokio::test]
async fn test_malformed_backend_answer_is_an_internal_error() {
    let mut sdk = SdkMockBuilder::new().await;
    sdk.mock_garbage("version").await;
    let app = TestApp::new(&config_for(&[sdk.url().as_str()]));

    let body = app.rpc(&rpc_body("version", &json!({}), 1), None).await;
    assert_eq!(body["error"]["code"], -32080);
    assert!(!body.to_string().contains("<html>"));
}

#[tokio::test]
async fn test_http_500_from_backend() {
    let mut sdk = SdkMockBuilder::new().await;
    sdk.mock_server_error().await;
    let app = TestApp::new(&config_for(&[sdk.url().as_str()]));

    let body = app.rpc(&rpc_body("file_list_public", &json!({}), 1), None).await;
    assert_eq!(body["error"]["code"], -32080);
}

#[tokio::test]
async fn test_forbidden_methods_never_reach_the_backend() {
    let backend = CountingBackend::start("sdk-a").await;
    let app = TestApp::new(&config_for(&[backend.url()]));

    for method in ["stop", "wallet_unlock", "settings_set"] {
        let body = app.rpc(&rpc_body(method, &json!({}), 1), Some("alice-token")).await;
        assert_eq!(body["error"]["code"], -32601, "{method} must be refused");
    }
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_malformed_requests() {
    let backend = CountingBackend::start("sdk-a").await;
    let app = TestApp::new(&config_for(&[backend.url()]));

    let post = |body: &'static str| {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    };

    let response = app.send(post("   ")).await;
    assert_eq!(response.status(), 400);
    assert_eq!(json_body(response).await["error"]["code"], -32700);

    let response = app.send(post("{\"jsonrpc\":")).await;
    assert_eq!(response.status(), 400);

    let response = app.send(post(r#"{"jsonrpc":"1.0","method":"status","id":"keep-me"}"#)).await;
    assert_eq!(response.status(), 200);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], "keep-me");

    let response = app.send(post(r#"{"jsonrpc":"2.0","method":"","id":3}"#)).await;
    assert_eq!(json_body(response).await["error"]["code"], -32600);

    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let backend = CountingBackend::start("sdk-a").await;
    let mut config = config_for(&[backend.url()]);
    config.server.max_body_bytes = 256;
    let app = TestApp::new(&config);

    let padding = "x".repeat(1024);
    let body = rpc_body("status", &json!({"pad": padding}), 1);

    let mut declared = rpc_post(&body, None);
    let length = body.to_string().len().to_string();
    declared.headers_mut().insert("content-length", length.parse().unwrap());
    let undeclared = rpc_post(&body, None);

    for request in [declared, undeclared] {
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["content-type"], "application/json");
        let reply = json_body(response).await;
        assert_eq!(reply["error"]["code"], -32700);
        assert_eq!(reply["jsonrpc"], "2.0");
    }
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_params_reach_the_backend_unchanged() {
    let backend = CountingBackend::start("sdk-a").await;
    let app = TestApp::new(&config_for(&[backend.url()]));
    let params = json!({"claim_id": "abc123", "page_size": 20, "nested": {"flag": true}});

    let body = app.rpc(&rpc_body("txo_list", &params, 1), Some("alice-token")).await;
    assert_eq!(body["result"]["method"], "txo_list");

    let forwarded = backend.last_request().unwrap();
    assert_eq!(forwarded["params"], params);
    assert_eq!(forwarded["method"], "txo_list");
}
