use std::{sync::Arc, time::Duration};

use crate::{
    auth::UserId,
    backend::{Backend, BackendError, HttpClient},
    cache::{CachePolicy, QueryCache},
    hooks::{HookContext, HookRegistry},
    proxy::ProxyError,
    types::{CacheStatus, JsonRpcRequest, JsonRpcResponse},
};

/// Executes one call against one backend on behalf of one (possibly anonymous) user.
///
/// Built per request by [`ProxyService`](crate::proxy::ProxyService) and handed to every hook
/// of that call. Never retries.
pub struct Caller {
    backend: Arc<Backend>,
    user_id: Option<UserId>,
    hooks: Arc<HookRegistry>,
    cache: Option<(Arc<QueryCache>, Arc<CachePolicy>)>,
    client: Arc<HttpClient>,
    timeout: Duration,
}

impl Caller {
    #[must_use]
    pub fn new(
        backend: Arc<Backend>,
        client: Arc<HttpClient>,
        hooks: Arc<HookRegistry>,
        timeout: Duration,
    ) -> Self {
        Self { backend, user_id: None, hooks, cache: None, client, timeout }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<QueryCache>, policy: Arc<CachePolicy>) -> Self {
        self.cache = Some((cache, policy));
        self
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs the full call: preflight hooks, the backend (through the cache when a rule
    /// applies), then postflight hooks on the outcome.
    ///
    /// The returned response always carries the id of the request in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the [`ProxyError`] left by the backend call or the hooks.
    pub async fn execute(&self, ctx: &mut HookContext) -> Result<JsonRpcResponse, ProxyError> {
        ctx.bind_call(Arc::clone(&self.backend), self.user_id);
        let id = Arc::clone(&ctx.request().id);

        let outcome = match self.hooks.run_preflight(self, ctx).await {
            Some(short_circuit) => short_circuit,
            None => self.call_backend(ctx).await,
        };

        ctx.set_outcome(outcome.map(|response| response.with_id(Arc::clone(&id))));
        self.hooks.run_postflight(self, ctx).await;

        match ctx.take_outcome() {
            Some(outcome) => outcome.map(|response| response.with_id(id)),
            None => Err(ProxyError::Internal("call outcome missing after postflight".to_string())),
        }
    }

    async fn call_backend(&self, ctx: &mut HookContext) -> Result<JsonRpcResponse, ProxyError> {
        let request = ctx.shared_request();

        let cached = self.cache.as_ref().and_then(|(cache, policy)| {
            policy.fingerprint(&request, self.user_id).map(|(fp, ttl)| (cache, fp, ttl))
        });

        match cached {
            Some((cache, fingerprint, ttl)) => {
                let (response, status) = cache
                    .get_or_compute(&fingerprint, ttl, self.timeout, || self.invoke(&request))
                    .await?;
                ctx.set_cache_status(status);
                Ok(response)
            }
            None => {
                ctx.set_cache_status(CacheStatus::Bypass);
                Ok(self.invoke(&request).await?)
            }
        }
    }

    /// Sends `request` straight to the bound backend, bypassing hooks and cache.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] on transport failure, timeout or a malformed reply.
    pub async fn invoke(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, BackendError> {
        tracing::trace!(method = %request.method, backend = %self.backend, "calling backend");
        self.client.call(&self.backend.url, request, self.timeout).await
    }
}
