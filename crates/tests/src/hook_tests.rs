//! Preflight and postflight hooks observed through the HTTP surface.

use crate::mock_infrastructure::{
    config_for, json_body, rpc_body, rpc_post, CountingBackend, RecordingAuditSink, SdkMockBuilder,
    TestApp,
};
use axum::Router;
use serde_json::{json, Value};
use server::{create_app, AppState};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use walletgate_core::{
    audit::AuditOutcome,
    backend::{Backend, BackendRegistry, HttpClient},
    config::ServerConfig,
    hooks::{FnHook, HookContext, HookOutcome, HookRegistry},
    proxy::{Caller, ProxyError, ProxyService},
    types::{JsonRpcResponse, MethodMatcher},
};

fn app_with_hooks(url: &str, hooks: HookRegistry) -> Router {
    let registry = Arc::new(BackendRegistry::new(vec![Backend::new("sdk-a", url)]));
    let service = ProxyService::builder(registry, Arc::new(HttpClient::new().unwrap()))
        .hooks(hooks)
        .build();
    create_app(
        AppState::new(Arc::new(service), "X-Lbry-Auth-Token", 1024 * 1024),
        &ServerConfig::default(),
    )
}

async fn call(app: &Router, body: &Value) -> Value {
    use tower::ServiceExt;
    json_body(app.clone().oneshot(rpc_post(body, None)).await.unwrap()).await
}

#[tokio::test]
async fn test_wallet_send_is_audited_with_user_and_address() {
    let backend = CountingBackend::start("sdk-a").await;
    let mut config = config_for(&[backend.url()]);
    config.hooks.enabled = vec!["remote_ip_log".into(), "wallet_send_audit".into(), "call_log".into()];
    let sink = Arc::new(RecordingAuditSink::default());
    let app = TestApp::with_audit(&config, sink.clone());

    let send = rpc_body("wallet_send", &json!({"amount": "1.0", "addresses": ["bAddr"]}), 1);
    let mut request = rpc_post(&send, Some("alice-token"));
    request.headers_mut().insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
    let body = json_body(app.send(request).await).await;
    assert_eq!(body["result"]["method"], "wallet_send");

    app.rpc(&rpc_body("wallet_balance", &json!({}), 2), Some("alice-token")).await;

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].method, "wallet_send");
    assert_eq!(events[0].outcome, AuditOutcome::Ok);
    assert_eq!(events[0].user_id, Some(7));
    assert_eq!(events[0].remote_ip.as_deref(), Some("203.0.113.9"));
    let audited: Value = serde_json::from_str(&events[0].body).unwrap();
    assert_eq!(audited, send);
}

#[tokio::test]
async fn test_rejected_wallet_send_is_audited_as_rpc_error() {
    let mut sdk = SdkMockBuilder::new().await;
    sdk.mock_rpc_error("wallet_send", -32500, "insufficient funds").await;
    let mut config = config_for(&[sdk.url().as_str()]);
    config.hooks.enabled = vec!["wallet_send_audit".into()];
    let sink = Arc::new(RecordingAuditSink::default());
    let app = TestApp::with_audit(&config, sink.clone());

    let body = app.rpc(&rpc_body("wallet_send", &json!({"amount": "9000"}), 1), Some("bob-token")).await;
    assert_eq!(body["error"]["message"], "insufficient funds");

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, AuditOutcome::RpcError);
    assert_eq!(events[0].user_id, Some(8));
}

#[tokio::test]
async fn test_unanswered_wallet_send_is_not_audited() {
    let mut config = config_for(&["http://127.0.0.1:1"]);
    config.hooks.enabled = vec!["wallet_send_audit".into()];
    let sink = Arc::new(RecordingAuditSink::default());
    let app = TestApp::with_audit(&config, sink.clone());

    let body = app.rpc(&rpc_body("wallet_send", &json!({}), 2), Some("bob-token")).await;
    assert_eq!(body["error"]["code"], -32080);
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_wallet_send_without_token_is_refused_and_not_audited() {
    let backend = CountingBackend::start("sdk-a").await;
    let mut config = config_for(&[backend.url()]);
    config.hooks.enabled = vec!["remote_ip_log".into(), "wallet_send_audit".into(), "call_log".into()];
    let sink = Arc::new(RecordingAuditSink::default());
    let app = TestApp::with_audit(&config, sink.clone());

    let send = rpc_body("wallet_send", &json!({"amount": "1.0", "addresses": ["bAddr"]}), "send-1");
    let body = app.rpc(&send, None).await;

    assert_eq!(body["error"]["code"], -32084);
    assert_eq!(body["id"], "send-1");
    assert!(sink.events().is_empty());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_preflight_answer_skips_the_backend() {
    let backend = CountingBackend::start("sdk-a").await;
    let hooks = HookRegistry::builder()
        .preflight(
            MethodMatcher::exact("version"),
            Arc::new(FnHook::new("maintenance", |_caller: &Caller, _ctx: &mut HookContext| {
                HookOutcome::Respond(JsonRpcResponse::success(
                    json!({"maintenance": true}),
                    Arc::new(Value::Null),
                ))
            })),
        )
        .build();
    let app = app_with_hooks(backend.url(), hooks);

    let body = call(&app, &rpc_body("version", &json!({}), "v-1")).await;
    assert_eq!(body["result"]["maintenance"], true);
    assert_eq!(body["id"], "v-1");

    let body = call(&app, &rpc_body("status", &json!({}), 2)).await;
    assert_eq!(body["result"]["method"], "status");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_preflight_rejection_reaches_the_client() {
    let backend = CountingBackend::start("sdk-a").await;
    let hooks = HookRegistry::builder()
        .preflight(
            MethodMatcher::prefix("blob_"),
            Arc::new(FnHook::new("announce_paused", |_caller: &Caller, _ctx: &mut HookContext| {
                HookOutcome::Fail(ProxyError::Rejected {
                    code: -32099,
                    message: "announcing is paused".to_string(),
                })
            })),
        )
        .build();
    let app = app_with_hooks(backend.url(), hooks);

    let body = call(&app, &rpc_body("blob_announce", &json!({}), 3)).await;
    assert_eq!(body["error"]["code"], -32099);
    assert_eq!(body["error"]["message"], "announcing is paused");
    assert_eq!(body["id"], 3);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_fields_flow_from_preflight_to_postflight() {
    let backend = CountingBackend::start("sdk-a").await;
    let hooks = HookRegistry::builder()
        .preflight(
            MethodMatcher::Any,
            Arc::new(FnHook::new("tag", |_caller: &Caller, ctx: &mut HookContext| {
                ctx.insert_field("tag", "from-preflight");
                HookOutcome::Continue
            })),
        )
        .postflight(
            MethodMatcher::exact("status"),
            Arc::new(FnHook::new("annotate", |caller: &Caller, ctx: &mut HookContext| {
                let Some(Ok(response)) = ctx.outcome() else {
                    return HookOutcome::Continue;
                };
                let mut result = response.result.clone().unwrap_or(Value::Null);
                result["tag"] = ctx.field("tag").cloned().unwrap_or(Value::Null);
                result["served_by"] = json!(caller.backend().name);
                HookOutcome::Respond(JsonRpcResponse::success(result, Arc::clone(&response.id)))
            })),
        )
        .build();
    let app = app_with_hooks(backend.url(), hooks);

    let body = call(&app, &rpc_body("status", &json!({}), 4)).await;
    assert_eq!(body["result"]["tag"], "from-preflight");
    assert_eq!(body["result"]["served_by"], "sdk-a");
    assert_eq!(body["result"]["method"], "status");
    assert_eq!(body["id"], 4);
}

#[tokio::test]
async fn test_postflight_sees_backend_failures() {
    let seen_failures = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen_failures);
    let hooks = HookRegistry::builder()
        .postflight(
            MethodMatcher::Any,
            Arc::new(FnHook::new("failure_counter", move |_caller: &Caller, ctx: &mut HookContext| {
                if matches!(ctx.outcome(), Some(Err(_))) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                HookOutcome::Continue
            })),
        )
        .build();
    let app = app_with_hooks("http://127.0.0.1:1", hooks);

    let body = call(&app, &rpc_body("status", &json!({}), 5)).await;
    assert_eq!(body["error"]["code"], -32080);
    assert_eq!(seen_failures.load(Ordering::SeqCst), 1);

    // requests rejected before a backend is chosen never reach hooks
    let body = call(&app, &rpc_body("stop", &json!({}), 6)).await;
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(seen_failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_postflight_cannot_turn_a_failure_into_success() {
    let hooks = HookRegistry::builder()
        .postflight(
            MethodMatcher::Any,
            Arc::new(FnHook::new("cover_up", |_caller: &Caller, _ctx: &mut HookContext| {
                HookOutcome::Respond(JsonRpcResponse::success(json!("all good"), Arc::new(Value::Null)))
            })),
        )
        .build();
    let app = app_with_hooks("http://127.0.0.1:1", hooks);

    let body = call(&app, &rpc_body("status", &json!({}), 7)).await;
    assert_eq!(body["error"]["code"], -32080);
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn test_unknown_hook_name_fails_startup() {
    let mut config = config_for(&["http://127.0.0.1:5280"]);
    config.hooks.enabled = vec!["teleport".into()];

    assert!(config.validate().is_err());
    let err = server::CoreServices::build(&config).err().unwrap();
    assert!(err.to_string().contains("teleport"));
}
