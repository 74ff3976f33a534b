use thiserror::Error;

/// Errors that can occur when talking to an SDK daemon.
///
/// The variants never embed the backend URL or raw transport errors so that they can be
/// cloned to every waiter of a shared computation and shown to operators without leaking
/// internal addresses to clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendError {
    /// Request exceeded the configured call timeout.
    #[error("Request timeout")]
    Timeout,

    /// Failed to reach the backend (refused, unreachable, reset).
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The backend answered with a non-2xx HTTP status.
    ///
    /// First field is the HTTP status code, second a truncated body excerpt.
    #[error("HTTP error {0}: {1}")]
    HttpError(u16, String),

    /// The backend answered, but the body was not a JSON-RPC response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be encoded for the backend.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The live backend set is empty.
    #[error("No backends available")]
    NoBackends,

    /// The shared HTTP client is saturated.
    #[error("Concurrency limit reached")]
    ConcurrencyLimit,
}

impl BackendError {
    /// Returns `true` when the backend produced a body that could not be decoded, as opposed
    /// to not answering at all.
    #[must_use]
    pub fn is_malformed_response(&self) -> bool {
        matches!(self, Self::InvalidResponse(_))
    }

    /// Returns `true` when no backend could even be selected.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::NoBackends)
    }

    /// Client-safe description used in JSON-RPC error envelopes.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Timeout => "backend timed out",
            Self::NoBackends => "service unavailable",
            Self::ConcurrencyLimit => "proxy is overloaded",
            Self::InvalidResponse(_) => "backend returned a malformed response",
            Self::ConnectionFailed(_) | Self::HttpError(_, _) | Self::InvalidRequest(_) => {
                "backend request failed"
            }
        }
    }

    /// Static label for metrics and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::HttpError(_, _) => "http_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NoBackends => "no_backends",
            Self::ConcurrencyLimit => "concurrency_limit",
        }
    }
}
