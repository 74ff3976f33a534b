use bytes::Bytes;
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    auth::UserId,
    backend::Backend,
    proxy::ProxyError,
    types::{CacheStatus, JsonRpcRequest, JsonRpcResponse},
};

/// Per-call scratch space shared by every hook of one call.
///
/// Hooks read the request and call metadata from here and leave structured fields for later
/// hooks (the built-in `call_log` hook prints them). During postflight the current outcome is
/// visible through [`outcome`](Self::outcome).
#[derive(Debug)]
pub struct HookContext {
    request: Arc<JsonRpcRequest>,
    raw_body: Bytes,
    remote_ip: Option<String>,
    backend: Option<Arc<Backend>>,
    user_id: Option<UserId>,
    fields: BTreeMap<String, Value>,
    outcome: Option<Result<JsonRpcResponse, ProxyError>>,
    cache_status: CacheStatus,
}

impl HookContext {
    #[must_use]
    pub fn new(request: Arc<JsonRpcRequest>, raw_body: Bytes, remote_ip: Option<String>) -> Self {
        Self {
            request,
            raw_body,
            remote_ip,
            backend: None,
            user_id: None,
            fields: BTreeMap::new(),
            outcome: None,
            cache_status: CacheStatus::Bypass,
        }
    }

    #[must_use]
    pub fn request(&self) -> &JsonRpcRequest {
        &self.request
    }

    #[must_use]
    pub fn shared_request(&self) -> Arc<JsonRpcRequest> {
        Arc::clone(&self.request)
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.request.method
    }

    /// The request body exactly as received.
    #[must_use]
    pub fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    #[must_use]
    pub fn remote_ip(&self) -> Option<&str> {
        self.remote_ip.as_deref()
    }

    #[must_use]
    pub fn backend(&self) -> Option<&Arc<Backend>> {
        self.backend.as_ref()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub(crate) fn bind_call(&mut self, backend: Arc<Backend>, user_id: Option<UserId>) {
        self.backend = Some(backend);
        self.user_id = user_id;
    }

    pub fn insert_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn remove_field(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Outcome of the call so far. `None` during preflight.
    #[must_use]
    pub fn outcome(&self) -> Option<&Result<JsonRpcResponse, ProxyError>> {
        self.outcome.as_ref()
    }

    /// True when the outcome so far is a response without a JSON-RPC error.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(&self.outcome, Some(Ok(response)) if !response.is_error())
    }

    /// How the response was produced. `Bypass` until the cache has been consulted.
    #[must_use]
    pub fn cache_status(&self) -> CacheStatus {
        self.cache_status
    }

    pub(crate) fn set_cache_status(&mut self, status: CacheStatus) {
        self.cache_status = status;
    }

    pub(crate) fn set_outcome(&mut self, outcome: Result<JsonRpcResponse, ProxyError>) {
        self.outcome = Some(outcome);
    }

    pub(crate) fn take_outcome(&mut self) -> Option<Result<JsonRpcResponse, ProxyError>> {
        self.outcome.take()
    }
}
