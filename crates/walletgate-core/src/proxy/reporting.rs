use std::sync::Arc;

use crate::proxy::ProxyError;

/// Context attached to a reported failure.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub method: String,
    pub backend: Option<String>,
    pub user_id: Option<u64>,
    pub error: ProxyError,
    /// Raw request body, when one was read.
    pub request: Option<bytes::Bytes>,
}

/// Destination for failures operators should look at (network and serialization errors).
pub trait ErrorReporter: Send + Sync {
    fn report(&self, report: ErrorReport);
}

/// Logs reports on the `errors` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, report: ErrorReport) {
        let request = report.request.as_ref().map(|body| String::from_utf8_lossy(body).into_owned());
        tracing::error!(
            target: "errors",
            method = %report.method,
            backend = ?report.backend,
            user_id = ?report.user_id,
            kind = report.error.kind().as_str(),
            error = %report.error,
            request = ?request,
            "call failed"
        );
    }
}

/// Whether a failure is worth an operator's attention.
#[must_use]
pub fn is_reportable(error: &ProxyError) -> bool {
    matches!(error, ProxyError::Backend(_) | ProxyError::Serialization(_) | ProxyError::Internal(_))
}

pub type SharedReporter = Arc<dyn ErrorReporter>;
