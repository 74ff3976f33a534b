//! Concurrent identical calls collapse into one backend call.

use crate::mock_infrastructure::{config_for, json_body, rpc_body, rpc_post, CountingBackend, TestApp};
use futures::future::join_all;
use serde_json::{json, Value};
use std::time::Duration;

const SLOW: Duration = Duration::from_millis(300);

#[tokio::test]
async fn test_concurrent_identical_calls_share_one_backend_call() {
    let backend = CountingBackend::start_with_delay("sdk-a", SLOW).await;
    let app = TestApp::new(&config_for(&[backend.url()]));
    let params = json!({"urls": ["lbry://what"]});

    let calls = (0..10).map(|id| {
        let app = &app;
        let params = &params;
        async move {
            let response = app.send(rpc_post(&rpc_body("resolve", params, id), None)).await;
            let cache_status = response.headers()["x-cache-status"].to_str().unwrap().to_string();
            (id, cache_status, json_body(response).await)
        }
    });
    let responses = join_all(calls).await;

    assert_eq!(backend.calls_for("resolve"), 1);
    let first_result = responses[0].2["result"].clone();
    for (id, cache_status, body) in &responses {
        assert_eq!(body["id"], *id, "every waiter gets its own id back");
        assert_eq!(body["result"], first_result);
        assert!(cache_status == "MISS" || cache_status == "HIT", "got {cache_status}");
    }

    let later = app.send(rpc_post(&rpc_body("resolve", &params, 99), None)).await;
    assert_eq!(later.headers()["x-cache-status"], "HIT");
    assert_eq!(backend.calls_for("resolve"), 1);
}

#[tokio::test]
async fn test_different_params_are_separate_calls() {
    let backend = CountingBackend::start_with_delay("sdk-a", SLOW).await;
    let app = TestApp::new(&config_for(&[backend.url()]));

    let first_body = rpc_body("resolve", &json!({"urls": ["lbry://one"]}), 1);
    let second_body = rpc_body("resolve", &json!({"urls": ["lbry://two"]}), 2);
    let first = app.rpc(&first_body, None);
    let second = app.rpc(&second_body, None);
    let (first, second) = tokio::join!(first, second);

    assert_eq!(backend.calls_for("resolve"), 2);
    assert_ne!(first["result"]["call"], second["result"]["call"]);
}

#[tokio::test]
async fn test_param_key_order_does_not_split_the_cache() {
    let backend = CountingBackend::start("sdk-a").await;
    let app = TestApp::new(&config_for(&[backend.url()]));

    let body_a = r#"{"jsonrpc":"2.0","method":"claim_search","params":{"name":"x","page":1},"id":1}"#;
    let body_b = r#"{"jsonrpc":"2.0","method":"claim_search","params":{"page":1,"name":"x"},"id":2}"#;

    let a = app.rpc(&serde_json::from_str::<Value>(body_a).unwrap(), None).await;
    let b = app.rpc(&serde_json::from_str::<Value>(body_b).unwrap(), None).await;

    assert_eq!(a["result"], b["result"]);
    assert_eq!(b["id"], 2);
    assert_eq!(backend.calls_for("claim_search"), 1);
}

#[tokio::test]
async fn test_per_user_entries_are_never_shared() {
    let backend = CountingBackend::start_with_delay("sdk-a", SLOW).await;
    let app = TestApp::new(&config_for(&[backend.url()]));
    let body = rpc_body("wallet_balance", &json!({}), 1);

    let (alice, bob) =
        tokio::join!(app.rpc(&body, Some("alice-token")), app.rpc(&body, Some("bob-token")));
    assert_eq!(backend.calls_for("wallet_balance"), 2);
    assert_ne!(alice["result"]["call"], bob["result"]["call"]);

    let again = app.send(rpc_post(&body, Some("alice-token"))).await;
    assert_eq!(again.headers()["x-cache-status"], "HIT");
    assert_eq!(json_body(again).await["result"], alice["result"]);
    assert_eq!(backend.calls_for("wallet_balance"), 2);
}

#[tokio::test]
async fn test_authenticated_and_anonymous_calls_use_different_entries() {
    let backend = CountingBackend::start("sdk-a").await;
    let app = TestApp::new(&config_for(&[backend.url()]));
    let body = rpc_body("resolve", &json!({"urls": ["lbry://mine"]}), 1);

    let anonymous = app.rpc(&body, None).await;
    let alice = app.rpc(&body, Some("alice-token")).await;

    assert_eq!(backend.calls_for("resolve"), 2);
    assert_ne!(anonymous["result"]["call"], alice["result"]["call"]);
}

#[tokio::test]
async fn test_cache_disabled_sends_every_call() {
    let backend = CountingBackend::start_with_delay("sdk-a", Duration::from_millis(100)).await;
    let mut config = config_for(&[backend.url()]);
    config.cache.enabled = false;
    let app = TestApp::new(&config);

    let calls = (0..4).map(|id| {
        let app = &app;
        async move { app.rpc(&rpc_body("status", &json!({}), id), None).await }
    });
    let responses = join_all(calls).await;

    assert_eq!(backend.calls_for("status"), 4);
    assert!(responses.iter().all(|body| body["result"]["backend"] == "sdk-a"));
}
