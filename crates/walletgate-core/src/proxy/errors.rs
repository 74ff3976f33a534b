use serde_json::Value;
use std::{fmt, sync::Arc};

use crate::{backend::BackendError, types::JsonRpcResponse};

pub const CODE_PARSE_ERROR: i32 = -32700;
pub const CODE_INVALID_REQUEST: i32 = -32600;
pub const CODE_METHOD_NOT_ALLOWED: i32 = -32601;
pub const CODE_SERIALIZATION: i32 = -32603;
pub const CODE_INTERNAL: i32 = -32080;
pub const CODE_AUTH_REQUIRED: i32 = -32084;
pub const CODE_FORBIDDEN: i32 = -32085;

/// Everything that can stop a call before a backend answer reaches the client.
///
/// Backend RPC errors are not here: a JSON-RPC `error` from a backend is a valid answer and
/// is passed through as a response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Empty request body")]
    EmptyBody,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Authentication failed: {0}")]
    AuthForbidden(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A hook refused the call.
    #[error("Rejected ({code}): {message}")]
    Rejected { code: i32, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure classification used as the `kind` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Client,
    ClientJson,
    Auth,
    Net,
    Rpc,
    RpcJson,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::ClientJson => "client_json",
            Self::Auth => "auth",
            Self::Net => "net",
            Self::Rpc => "rpc",
            Self::RpcJson => "rpc_json",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProxyError {
    /// JSON-RPC error code sent to the client.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) | Self::EmptyBody => CODE_PARSE_ERROR,
            Self::InvalidRequest(_) => CODE_INVALID_REQUEST,
            Self::MethodNotAllowed(_) => CODE_METHOD_NOT_ALLOWED,
            Self::AuthRequired => CODE_AUTH_REQUIRED,
            Self::AuthForbidden(_) => CODE_FORBIDDEN,
            Self::Backend(_) | Self::Internal(_) => CODE_INTERNAL,
            Self::Serialization(_) => CODE_SERIALIZATION,
            Self::Rejected { code, .. } => *code,
        }
    }

    /// HTTP status of the envelope. Only an unreadable body is an HTTP-level failure; every
    /// other error travels inside a 200 JSON-RPC response.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Parse(_) | Self::EmptyBody => 400,
            _ => 200,
        }
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Parse(_) | Self::EmptyBody => FailureKind::ClientJson,
            Self::InvalidRequest(_) | Self::MethodNotAllowed(_) | Self::Rejected { .. } => {
                FailureKind::Client
            }
            Self::AuthRequired | Self::AuthForbidden(_) => FailureKind::Auth,
            Self::Backend(e) if e.is_malformed_response() => FailureKind::RpcJson,
            Self::Backend(_) | Self::Internal(_) => FailureKind::Net,
            Self::Serialization(_) => FailureKind::RpcJson,
        }
    }

    /// Message shown to the client. Backend addresses and internal details never appear here.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Parse(detail) => format!("parse error: {detail}"),
            Self::EmptyBody => "empty request body".to_string(),
            Self::InvalidRequest(detail) => format!("invalid request: {detail}"),
            Self::MethodNotAllowed(method) => format!("method '{method}' is not allowed"),
            Self::AuthRequired => "authentication required".to_string(),
            Self::AuthForbidden(reason) => format!("could not authenticate user: {reason}"),
            Self::Backend(e) => e.public_message().to_string(),
            Self::Serialization(_) => "error serializing response".to_string(),
            Self::Rejected { message, .. } => message.clone(),
            Self::Internal(_) => "internal error".to_string(),
        }
    }

    /// JSON-RPC envelope for this error, answering request `id`.
    #[must_use]
    pub fn to_response(&self, id: Arc<Value>) -> JsonRpcResponse {
        JsonRpcResponse::error(self.code(), self.public_message(), id)
    }
}
