use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, State},
    http::{header::CONTENT_LENGTH, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use std::{net::SocketAddr, sync::Arc};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::debug;
use walletgate_core::{
    config::ServerConfig,
    proxy::{InboundCall, ProxyError, ProxyService},
};

use crate::middleware::{auth_token, remote_ip, request_id_layers, request_id_of};

/// Headers a browser may send besides the auth token header.
pub const CORS_BASE_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";
pub const CORS_MAX_AGE: &str = "7200";

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProxyService>,
    pub token_header: Arc<str>,
    pub max_body_bytes: usize,
    cors_allow_headers: Arc<str>,
}

impl AppState {
    #[must_use]
    pub fn new(service: Arc<ProxyService>, token_header: &str, max_body_bytes: usize) -> Self {
        Self {
            service,
            token_header: Arc::from(token_header),
            max_body_bytes,
            cors_allow_headers: Arc::from(cors_allow_headers(token_header)),
        }
    }
}

/// The `Access-Control-Allow-Headers` value for a given auth token header.
#[must_use]
pub fn cors_allow_headers(token_header: &str) -> String {
    format!("{token_header}, {CORS_BASE_HEADERS}")
}

/// Builds the public router: JSON-RPC and CORS on `/`, plus `/health` and `/metrics`.
pub fn create_app(state: AppState, server: &ServerConfig) -> Router {
    let (set_request_id, propagate_request_id) = request_id_layers();
    let (set_request_id_public, propagate_request_id_public) = request_id_layers();

    let public = Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(state.clone())
        .layer(propagate_request_id_public)
        .layer(set_request_id_public);

    let rpc = Router::new()
        .route("/", post(handle_rpc).options(handle_cors_preflight))
        .with_state(state)
        .layer(ConcurrencyLimitLayer::new(server.max_concurrent_requests))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        // layers run in reverse order, so propagate sees the id set below it
        .layer(propagate_request_id)
        .layer(set_request_id);

    public.merge(rpc)
}

/// Proxies one JSON-RPC call.
pub async fn handle_rpc(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request_id_of(&request).map(str::to_owned);
    let (parts, body) = request.into_parts();

    let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.ip());
    let remote_ip = remote_ip(&parts.headers, peer);
    let auth_token = auth_token(&parts.headers, &state.token_header);

    // the limit is enforced here so oversized bodies still get a JSON-RPC error
    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > state.max_body_bytes) {
        debug!(request_id = ?request_id, declared = ?declared, "request body over the limit");
        return unreadable_body_response();
    }

    let body = match to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            debug!(request_id = ?request_id, error = %e, "could not read request body");
            return unreadable_body_response();
        }
    };

    let call = InboundCall { body, auth_token, remote_ip };
    let reply = state.service.handle(call).await;

    rpc_response(
        StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK),
        reply.cache_status.to_string(),
        reply.body,
    )
}

fn unreadable_body_response() -> Response {
    let error = ProxyError::Parse("request body could not be read".to_string());
    let body =
        serde_json::to_vec(&error.to_response(Arc::new(serde_json::Value::Null))).unwrap_or_default();
    rpc_response(StatusCode::BAD_REQUEST, "BYPASS".to_string(), Bytes::from(body))
}

fn rpc_response(status: StatusCode, cache_status: String, body: Bytes) -> Response {
    (
        status,
        [
            ("content-type", "application/json".to_string()),
            ("access-control-allow-origin", "*".to_string()),
            ("x-cache-status", cache_status),
        ],
        body,
    )
        .into_response()
}

/// Answers CORS preflight requests without touching the JSON-RPC path.
#[allow(clippy::unused_async)]
pub async fn handle_cors_preflight(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            ("access-control-allow-origin", "*".to_string()),
            ("access-control-max-age", CORS_MAX_AGE.to_string()),
            ("access-control-allow-headers", state.cors_allow_headers.to_string()),
        ],
    )
}

#[allow(clippy::unused_async)]
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.metrics() {
        Some(metrics) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            metrics.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [("content-type", "text/plain; charset=utf-8")],
            "metrics disabled".to_string(),
        ),
    }
}

#[allow(clippy::unused_async)]
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.service.registry();
    let healthy = !registry.is_empty();

    let health_status = serde_json::json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "backends": {
            "total": registry.len(),
            "bound_users": registry.binding_count(),
        },
        "cache": state.service.cache_stats(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    });

    (
        if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE },
        [("content-type", "application/json")],
        serde_json::to_string(&health_status).unwrap_or_default(),
    )
}
