//! Audit trail for wallet-mutating calls.
//!
//! Records go through an [`AuditSink`] so deployments can ship them somewhere durable; the
//! default sink logs them on the `audit` tracing target.

use serde::Serialize;

use crate::auth::UserId;

/// How the daemon answered an audited call.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Ok,
    RpcError,
}

impl AuditOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::RpcError => "rpc_error",
        }
    }
}

/// One audited call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuditEvent {
    /// RFC 3339 timestamp
    pub timestamp: String,
    pub method: String,
    pub outcome: AuditOutcome,
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
    /// The request body exactly as the client sent it
    pub body: String,
}

impl AuditEvent {
    #[must_use]
    pub fn new(method: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            method: method.into(),
            outcome: AuditOutcome::Ok,
            user_id: None,
            remote_ip: None,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    #[must_use]
    pub fn with_remote_ip(mut self, remote_ip: Option<String>) -> Self {
        self.remote_ip = remote_ip;
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events to the `audit` tracing target at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            timestamp = %event.timestamp,
            method = %event.method,
            outcome = event.outcome.as_str(),
            user_id = ?event.user_id,
            remote_ip = ?event.remote_ip,
            body = %event.body,
            "wallet_call_audit"
        );
    }
}
