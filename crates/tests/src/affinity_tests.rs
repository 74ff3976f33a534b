//! Session affinity: an authenticated user's calls always land on one backend.

use crate::mock_infrastructure::{config_for, rpc_body, CountingBackend, TestApp};
use serde_json::json;
use std::collections::HashSet;
use walletgate_core::backend::Backend;

async fn three_backends() -> Vec<CountingBackend> {
    vec![
        CountingBackend::start("sdk-a").await,
        CountingBackend::start("sdk-b").await,
        CountingBackend::start("sdk-c").await,
    ]
}

fn uncached_app(backends: &[CountingBackend]) -> TestApp {
    let urls: Vec<&str> = backends.iter().map(CountingBackend::url).collect();
    let mut config = config_for(&urls);
    config.cache.enabled = false;
    TestApp::new(&config)
}

#[tokio::test]
async fn test_user_calls_stick_to_one_backend() {
    let backends = three_backends().await;
    let app = uncached_app(&backends);

    let mut seen = HashSet::new();
    for id in 0..15 {
        let body = app.rpc(&rpc_body("wallet_balance", &json!({}), id), Some("alice-token")).await;
        seen.insert(body["result"]["backend"].as_str().unwrap().to_string());
    }

    assert_eq!(seen.len(), 1, "alice was served by {seen:?}");
    let busy: Vec<_> = backends.iter().filter(|b| b.calls() > 0).collect();
    assert_eq!(busy.len(), 1);
    assert_eq!(busy[0].calls(), 15);
    assert_eq!(app.services.registry.binding_count(), 1);
}

#[tokio::test]
async fn test_binding_covers_every_method_the_user_calls() {
    let backends = three_backends().await;
    let app = uncached_app(&backends);

    let mut seen = HashSet::new();
    for method in ["wallet_balance", "txo_list", "publish", "resolve", "claim_search"] {
        let body = app.rpc(&rpc_body(method, &json!({}), 1), Some("bob-token")).await;
        seen.insert(body["result"]["backend"].as_str().unwrap().to_string());
    }
    assert_eq!(seen.len(), 1);
}

#[tokio::test]
async fn test_anonymous_calls_are_spread() {
    let backends = three_backends().await;
    let app = uncached_app(&backends);

    for id in 0..40 {
        app.rpc(&rpc_body("status", &json!({}), id), None).await;
    }

    let used = backends.iter().filter(|b| b.calls() > 0).count();
    assert!(used >= 2, "40 anonymous calls all went to one backend");
    assert_eq!(app.services.registry.binding_count(), 0);
}

#[tokio::test]
async fn test_removed_backend_rebinds_the_user() {
    let backends = three_backends().await;
    let app = uncached_app(&backends);
    let registry = &app.services.registry;

    let first = app.rpc(&rpc_body("wallet_balance", &json!({}), 1), Some("alice-token")).await;
    let bound = first["result"]["backend"].as_str().unwrap().to_string();
    let bound_url = backends.iter().find(|b| b.name() == bound).unwrap().url();
    assert_eq!(registry.binding_for(7).unwrap().url, bound_url);

    let survivors: Vec<Backend> = backends
        .iter()
        .filter(|b| b.name() != bound)
        .map(|b| Backend::new(b.name(), b.url()))
        .collect();
    registry.replace_backends(survivors);
    assert_eq!(registry.binding_count(), 0);

    let mut seen = HashSet::new();
    for id in 2..8 {
        let body = app.rpc(&rpc_body("wallet_balance", &json!({}), id), Some("alice-token")).await;
        seen.insert(body["result"]["backend"].as_str().unwrap().to_string());
    }
    assert_eq!(seen.len(), 1);
    assert!(!seen.contains(&bound));
}

#[tokio::test]
async fn test_distinct_users_bind_independently() {
    let backends = three_backends().await;
    let app = uncached_app(&backends);

    app.rpc(&rpc_body("wallet_balance", &json!({}), 1), Some("alice-token")).await;
    app.rpc(&rpc_body("wallet_balance", &json!({}), 2), Some("bob-token")).await;

    let registry = &app.services.registry;
    assert_eq!(registry.binding_count(), 2);
    assert!(registry.binding_for(7).is_some());
    assert!(registry.binding_for(8).is_some());
}

#[tokio::test]
async fn test_public_calls_with_a_token_follow_the_user() {
    let backends = three_backends().await;
    let app = uncached_app(&backends);

    let mut seen = HashSet::new();
    for (id, method) in ["status", "version", "status", "wallet_balance"].iter().cycle().take(30).enumerate() {
        let body = app.rpc(&rpc_body(method, &json!({}), id), Some("alice-token")).await;
        seen.insert(body["result"]["backend"].as_str().unwrap().to_string());
    }

    assert_eq!(seen.len(), 1, "alice was served by {seen:?}");
    assert_eq!(app.services.registry.binding_count(), 1);
    assert!(app.services.registry.binding_for(7).is_some());
}
