use async_trait::async_trait;
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

use crate::{
    hooks::HookContext,
    metrics::MetricsCollector,
    proxy::{Caller, ProxyError},
    types::{JsonRpcResponse, MethodMatcher},
};

/// When a hook runs relative to the backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Preflight,
    Postflight,
}

impl Phase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::Postflight => "postflight",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a hook wants to happen next.
#[derive(Debug, Clone)]
pub enum HookOutcome {
    /// Keep going.
    Continue,
    /// Preflight: answer without calling the backend. Postflight: replace the response.
    Respond(JsonRpcResponse),
    /// Abort the call with this error.
    Fail(ProxyError),
}

/// Interceptor run before or after the backend call.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, caller: &Caller, ctx: &mut HookContext) -> HookOutcome;
}

/// Adapts a synchronous closure into a [`Hook`].
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&Caller, &mut HookContext) -> HookOutcome + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&Caller, &mut HookContext) -> HookOutcome + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, caller: &Caller, ctx: &mut HookContext) -> HookOutcome {
        (self.f)(caller, ctx)
    }
}

struct Registration {
    matcher: MethodMatcher,
    phase: Phase,
    hook: Arc<dyn Hook>,
}

/// Immutable, ordered set of hooks. Built once at startup and shared by every call.
#[derive(Default)]
pub struct HookRegistry {
    registrations: Vec<Registration>,
    metrics: Option<MetricsCollector>,
}

/// Collects hook registrations in order.
#[derive(Default)]
pub struct HookRegistryBuilder {
    registrations: Vec<Registration>,
    metrics: Option<MetricsCollector>,
}

impl HookRegistryBuilder {
    #[must_use]
    pub fn preflight(mut self, matcher: MethodMatcher, hook: Arc<dyn Hook>) -> Self {
        self.registrations.push(Registration { matcher, phase: Phase::Preflight, hook });
        self
    }

    #[must_use]
    pub fn postflight(mut self, matcher: MethodMatcher, hook: Arc<dyn Hook>) -> Self {
        self.registrations.push(Registration { matcher, phase: Phase::Postflight, hook });
        self
    }

    #[must_use]
    pub fn register(self, matcher: MethodMatcher, phase: Phase, hook: Arc<dyn Hook>) -> Self {
        match phase {
            Phase::Preflight => self.preflight(matcher, hook),
            Phase::Postflight => self.postflight(matcher, hook),
        }
    }

    /// Counts hook failures in `walletgate_hook_failures_total`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn build(self) -> HookRegistry {
        HookRegistry { registrations: self.registrations, metrics: self.metrics }
    }
}

impl HookRegistry {
    #[must_use]
    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::default()
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Hooks for `method` in `phase`, in registration order whatever their matcher kind.
    pub fn matching<'a>(
        &'a self,
        method: &'a str,
        phase: Phase,
    ) -> impl Iterator<Item = &'a Arc<dyn Hook>> + 'a {
        self.registrations
            .iter()
            .filter(move |r| r.phase == phase && r.matcher.matches(method))
            .map(|r| &r.hook)
    }

    fn record_failure(&self, hook: &str, phase: Phase) {
        if let Some(metrics) = &self.metrics {
            metrics.record_hook_failure(hook, phase);
        }
    }

    /// Runs preflight hooks in order.
    ///
    /// Returns `Some` when a hook short-circuits (`Respond`) or aborts (`Fail`); the remaining
    /// preflight hooks are skipped.
    pub async fn run_preflight(
        &self,
        caller: &Caller,
        ctx: &mut HookContext,
    ) -> Option<Result<JsonRpcResponse, ProxyError>> {
        let request = ctx.shared_request();
        for hook in self.matching(&request.method, Phase::Preflight) {
            match hook.call(caller, ctx).await {
                HookOutcome::Continue => {}
                HookOutcome::Respond(response) => {
                    debug!(hook = hook.name(), method = %request.method, "preflight hook answered the call");
                    return Some(Ok(response));
                }
                HookOutcome::Fail(error) => {
                    warn!(hook = hook.name(), method = %request.method, error = %error, "preflight hook failed the call");
                    self.record_failure(hook.name(), Phase::Preflight);
                    return Some(Err(error));
                }
            }
        }
        None
    }

    /// Runs postflight hooks on the outcome stored in `ctx`.
    ///
    /// A `Respond` replaces the response and ends the phase, but only if it keeps the outcome's
    /// class: success stays success, failure stays failure. A mismatched replacement is
    /// dropped with a warning. A `Fail` turns the outcome into that error and later hooks
    /// still run.
    pub async fn run_postflight(&self, caller: &Caller, ctx: &mut HookContext) {
        let request = ctx.shared_request();
        for hook in self.matching(&request.method, Phase::Postflight) {
            match hook.call(caller, ctx).await {
                HookOutcome::Continue => {}
                HookOutcome::Respond(replacement) => {
                    let failed = !ctx.succeeded();
                    if replacement.is_error() == failed {
                        debug!(hook = hook.name(), method = %request.method, "postflight hook replaced the response");
                        ctx.set_outcome(Ok(replacement));
                        return;
                    }
                    warn!(
                        hook = hook.name(),
                        method = %request.method,
                        "postflight replacement would change the call's success status, ignored"
                    );
                }
                HookOutcome::Fail(error) => {
                    warn!(hook = hook.name(), method = %request.method, error = %error, "postflight hook failed the call");
                    self.record_failure(hook.name(), Phase::Postflight);
                    ctx.set_outcome(Err(error));
                }
            }
        }
    }
}
