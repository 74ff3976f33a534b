use bytes::Bytes;
use serde_json::Value;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

use crate::{
    auth::{AuthOutcome, MethodPolicyTable, StaticTokenResolver, UserId, UserResolver},
    backend::{Backend, BackendRegistry, HttpClient},
    cache::{CachePolicy, CacheStats, QueryCache},
    hooks::{HookContext, HookRegistry},
    metrics::{MetricsCollector, NO_BACKEND},
    proxy::{
        reporting::{is_reportable, ErrorReport, SharedReporter, TracingErrorReporter},
        Caller, FailureKind, ProxyError,
    },
    types::{CacheStatus, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION},
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const UNKNOWN_METHOD: &str = "unknown";

/// One inbound HTTP call, stripped of transport details.
#[derive(Debug, Clone, Default)]
pub struct InboundCall {
    pub body: Bytes,
    pub auth_token: Option<String>,
    pub remote_ip: Option<String>,
}

impl InboundCall {
    #[must_use]
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_remote_ip(mut self, ip: impl Into<String>) -> Self {
        self.remote_ip = Some(ip.into());
        self
    }
}

/// Serialized answer to an [`InboundCall`].
#[derive(Debug, Clone)]
pub struct ProxyReply {
    pub status: u16,
    pub body: Bytes,
    pub cache_status: CacheStatus,
}

/// Who a call is routed for, and who it runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Identity {
    route_as: Option<UserId>,
    run_as: Option<UserId>,
}

impl Identity {
    const ANONYMOUS: Self = Self { route_as: None, run_as: None };
}

/// What the pipeline learned about a call, for metrics and error reports.
struct CallState {
    method: Option<String>,
    id: Arc<Value>,
    backend: Option<Arc<Backend>>,
    user_id: Option<UserId>,
    cache_status: CacheStatus,
}

impl CallState {
    fn new() -> Self {
        Self {
            method: None,
            id: Arc::new(Value::Null),
            backend: None,
            user_id: None,
            cache_status: CacheStatus::Bypass,
        }
    }

    fn method(&self) -> &str {
        self.method.as_deref().unwrap_or(UNKNOWN_METHOD)
    }

    fn backend_name(&self) -> &str {
        self.backend.as_deref().map_or(NO_BACKEND, |b| b.name.as_str())
    }
}

/// The request pipeline: decode, gate, route, execute, encode.
///
/// Every call, whatever its outcome, produces exactly one call-duration observation and, on
/// failure, one failed-call observation labelled with its [`FailureKind`].
pub struct ProxyService {
    registry: Arc<BackendRegistry>,
    client: Arc<HttpClient>,
    hooks: Arc<HookRegistry>,
    cache: Option<(Arc<QueryCache>, Arc<CachePolicy>)>,
    policies: Arc<MethodPolicyTable>,
    resolver: Arc<dyn UserResolver>,
    metrics: Option<MetricsCollector>,
    reporter: SharedReporter,
    timeout: Duration,
}

/// Assembles a [`ProxyService`]. Only the backend registry and HTTP client are required.
pub struct ProxyServiceBuilder {
    registry: Arc<BackendRegistry>,
    client: Arc<HttpClient>,
    hooks: Arc<HookRegistry>,
    cache: Option<(Arc<QueryCache>, Arc<CachePolicy>)>,
    policies: MethodPolicyTable,
    resolver: Arc<dyn UserResolver>,
    metrics: Option<MetricsCollector>,
    reporter: SharedReporter,
    timeout: Duration,
}

impl ProxyServiceBuilder {
    #[must_use]
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<QueryCache>, policy: CachePolicy) -> Self {
        self.cache = Some((cache, Arc::new(policy)));
        self
    }

    #[must_use]
    pub fn policies(mut self, policies: MethodPolicyTable) -> Self {
        self.policies = policies;
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn UserResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Bounds each backend call, including time spent waiting on a shared cache computation.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn build(self) -> ProxyService {
        ProxyService {
            registry: self.registry,
            client: self.client,
            hooks: self.hooks,
            cache: self.cache,
            policies: Arc::new(self.policies),
            resolver: self.resolver,
            metrics: self.metrics,
            reporter: self.reporter,
            timeout: self.timeout,
        }
    }
}

impl ProxyService {
    #[must_use]
    pub fn builder(registry: Arc<BackendRegistry>, client: Arc<HttpClient>) -> ProxyServiceBuilder {
        ProxyServiceBuilder {
            registry,
            client,
            hooks: Arc::new(HookRegistry::empty()),
            cache: None,
            policies: MethodPolicyTable::default(),
            resolver: Arc::new(StaticTokenResolver::default()),
            metrics: None,
            reporter: Arc::new(TracingErrorReporter),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn metrics(&self) -> Option<&MetricsCollector> {
        self.metrics.as_ref()
    }

    #[must_use]
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|(cache, _)| cache.stats())
    }

    /// Handles one call end to end. Never fails: every error becomes a JSON-RPC error body.
    pub async fn handle(&self, call: InboundCall) -> ProxyReply {
        let start = Instant::now();
        let mut state = CallState::new();

        let outcome = self.process(&call, &mut state).await;

        let (status, response, mut failure) = match outcome {
            Ok(response) => {
                let failure = response.is_error().then_some(FailureKind::Rpc);
                (200, response, failure)
            }
            Err(error) => {
                self.report(&state, &call, &error);
                let failure = Some(error.kind());
                (error.http_status(), error.to_response(Arc::clone(&state.id)), failure)
            }
        };

        let body = match serde_json::to_vec(&response) {
            Ok(body) => body,
            Err(e) => {
                let error = ProxyError::Serialization(e.to_string());
                self.report(&state, &call, &error);
                failure = Some(error.kind());
                serde_json::to_vec(&error.to_response(Arc::clone(&state.id))).unwrap_or_default()
            }
        };

        let elapsed = start.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_call(state.method(), state.backend_name(), elapsed);
            if let Some(kind) = failure {
                metrics.record_call_failure(state.method(), state.backend_name(), kind, elapsed);
            }
            metrics.record_cache_status(state.method(), state.cache_status);
        }

        debug!(
            method = state.method(),
            backend = state.backend_name(),
            user_id = ?state.user_id,
            cache = %state.cache_status,
            failure = failure.map(|k| k.as_str()),
            elapsed_ms = elapsed.as_millis(),
            "call completed"
        );

        ProxyReply { status, body: Bytes::from(body), cache_status: state.cache_status }
    }

    async fn process(
        &self,
        call: &InboundCall,
        state: &mut CallState,
    ) -> Result<JsonRpcResponse, ProxyError> {
        let request = Self::decode(&call.body, state)?;
        state.method = Some(request.method.clone());

        if self.policies.is_forbidden(&request.method) {
            return Err(ProxyError::MethodNotAllowed(request.method));
        }

        let identity = self.authenticate(&request, call.auth_token.as_deref()).await?;
        state.user_id = identity.run_as;

        let backend = match identity.route_as {
            Some(user) => self.registry.backend_for_user(user)?,
            None => self.registry.pick_random()?,
        };
        state.backend = Some(Arc::clone(&backend));

        let mut caller = Caller::new(backend, Arc::clone(&self.client), Arc::clone(&self.hooks), self.timeout)
            .with_user(state.user_id);
        if let Some((cache, policy)) = &self.cache {
            caller = caller.with_cache(Arc::clone(cache), Arc::clone(policy));
        }

        let mut ctx = HookContext::new(Arc::new(request), call.body.clone(), call.remote_ip.clone());
        let result = caller.execute(&mut ctx).await;
        state.cache_status = ctx.cache_status();
        result
    }

    fn decode(body: &Bytes, state: &mut CallState) -> Result<JsonRpcRequest, ProxyError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ProxyError::EmptyBody);
        }

        let value: Value =
            serde_json::from_slice(body).map_err(|e| ProxyError::Parse(e.to_string()))?;
        if let Some(id) = value.get("id") {
            state.id = Arc::new(id.clone());
        }

        let request: JsonRpcRequest =
            serde_json::from_value(value).map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(ProxyError::InvalidRequest(format!(
                "unsupported jsonrpc version '{}'",
                request.jsonrpc
            )));
        }
        if request.method.is_empty() {
            return Err(ProxyError::InvalidRequest("method is empty".to_string()));
        }
        Ok(request)
    }

    /// Applies the auth gate.
    ///
    /// A presented token is resolved for every method so the user's calls stay on one backend.
    /// Only methods that accept a wallet run as that user. Methods that merely accept one, and
    /// public methods, fall back to anonymous when authentication fails.
    async fn authenticate(
        &self,
        request: &JsonRpcRequest,
        token: Option<&str>,
    ) -> Result<Identity, ProxyError> {
        if !self.policies.accepts_wallet(&request.method) {
            let Some(token) = token.filter(|t| !t.is_empty()) else {
                return Ok(Identity::ANONYMOUS);
            };
            let outcome = self.classify(Some(token)).await;
            return Ok(match outcome {
                AuthOutcome::Authenticated(user) => Identity { route_as: Some(user.id), run_as: None },
                _ => Identity::ANONYMOUS,
            });
        }

        let outcome = self.classify(token).await;
        if let AuthOutcome::Authenticated(user) = outcome {
            return Ok(Identity { route_as: Some(user.id), run_as: Some(user.id) });
        }

        if self.policies.requires_wallet(&request.method, request.params.as_ref()) {
            if let AuthOutcome::Failed(reason) = &outcome {
                warn!(method = %request.method, reason = %reason, "authentication failed");
            }
            return Err(outcome.into_gate_error().unwrap_or(ProxyError::AuthRequired));
        }

        debug!(method = %request.method, "proceeding anonymously");
        Ok(Identity::ANONYMOUS)
    }

    async fn classify(&self, token: Option<&str>) -> AuthOutcome {
        let outcome = AuthOutcome::classify(self.resolver.resolve(token).await);
        if let Some(metrics) = &self.metrics {
            metrics.record_auth_result(match &outcome {
                AuthOutcome::Authenticated(_) => "authenticated",
                AuthOutcome::NoAuthInfo => "no_auth_info",
                AuthOutcome::Failed(_) => "failed",
            });
        }
        outcome
    }

    fn report(&self, state: &CallState, call: &InboundCall, error: &ProxyError) {
        if !is_reportable(error) {
            return;
        }
        self.reporter.report(ErrorReport {
            method: state.method().to_string(),
            backend: state.backend.as_ref().map(|b| b.name.clone()),
            user_id: state.user_id,
            error: error.clone(),
            request: Some(call.body.clone()),
        });
    }
}
