//! Hooks shipped with the proxy, enabled by name from configuration.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    audit::{AuditEvent, AuditOutcome, AuditSink},
    hooks::{Hook, HookContext, HookOutcome, HookRegistryBuilder},
    proxy::Caller,
    types::MethodMatcher,
};

pub const REMOTE_IP_LOG: &str = "remote_ip_log";
pub const WALLET_SEND_AUDIT: &str = "wallet_send_audit";
pub const CALL_LOG: &str = "call_log";

pub const BUILTIN_HOOKS: &[&str] = &[REMOTE_IP_LOG, WALLET_SEND_AUDIT, CALL_LOG];

/// Adds the client address to the call's log fields.
pub struct RemoteIpLogHook;

#[async_trait]
impl Hook for RemoteIpLogHook {
    fn name(&self) -> &str {
        REMOTE_IP_LOG
    }

    async fn call(&self, _caller: &Caller, ctx: &mut HookContext) -> HookOutcome {
        if let Some(ip) = ctx.remote_ip().map(str::to_owned) {
            ctx.insert_field("remote_ip", ip);
        }
        HookOutcome::Continue
    }
}

/// Writes an audit record for every call the daemon answered, rejected transfers included.
///
/// Calls that never got an answer (network failures, gate rejections) are not audited.
pub struct WalletSendAuditHook {
    sink: Arc<dyn AuditSink>,
}

impl WalletSendAuditHook {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Hook for WalletSendAuditHook {
    fn name(&self) -> &str {
        WALLET_SEND_AUDIT
    }

    async fn call(&self, _caller: &Caller, ctx: &mut HookContext) -> HookOutcome {
        let outcome = match ctx.outcome() {
            Some(Ok(response)) if response.is_error() => AuditOutcome::RpcError,
            Some(Ok(_)) => AuditOutcome::Ok,
            _ => return HookOutcome::Continue,
        };
        let body = String::from_utf8_lossy(ctx.raw_body()).into_owned();
        self.sink.record(
            AuditEvent::new(ctx.method(), body)
                .with_outcome(outcome)
                .with_user(ctx.user_id())
                .with_remote_ip(ctx.remote_ip().map(str::to_owned)),
        );
        HookOutcome::Continue
    }
}

/// One debug line per call with every field earlier hooks left behind.
pub struct CallLogHook;

#[async_trait]
impl Hook for CallLogHook {
    fn name(&self) -> &str {
        CALL_LOG
    }

    async fn call(&self, _caller: &Caller, ctx: &mut HookContext) -> HookOutcome {
        let outcome = match ctx.outcome() {
            Some(Ok(response)) if response.is_error() => "rpc_error",
            Some(Ok(_)) => "ok",
            Some(Err(_)) => "failed",
            None => "pending",
        };
        let fields = serde_json::to_string(ctx.fields()).unwrap_or_default();
        tracing::debug!(
            method = %ctx.method(),
            backend = ctx.backend().map(|b| b.name.as_str()),
            user_id = ?ctx.user_id(),
            outcome,
            fields = %fields,
            "call finished"
        );
        HookOutcome::Continue
    }
}

/// Registers the named built-in hooks, in the order given.
///
/// # Errors
///
/// Returns the first unknown hook name.
pub fn install(
    mut builder: HookRegistryBuilder,
    enabled: &[String],
    audit_sink: &Arc<dyn AuditSink>,
) -> Result<HookRegistryBuilder, String> {
    for name in enabled {
        builder = match name.as_str() {
            REMOTE_IP_LOG => builder.postflight(MethodMatcher::prefix("wallet_"), Arc::new(RemoteIpLogHook)),
            WALLET_SEND_AUDIT => builder.postflight(
                MethodMatcher::exact("wallet_send"),
                Arc::new(WalletSendAuditHook::new(Arc::clone(audit_sink))),
            ),
            CALL_LOG => builder.postflight(MethodMatcher::Any, Arc::new(CallLogHook)),
            other => return Err(format!("unknown hook: {other}")),
        };
    }
    Ok(builder)
}
