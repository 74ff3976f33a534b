//! The request pipeline.
//!
//! [`ProxyService`] owns everything a call needs and turns an [`InboundCall`] into a
//! [`ProxyReply`]. Per call it builds a [`Caller`] bound to one backend and one user, and the
//! caller runs hooks, cache and backend in order.
//!
//! ```text
//! InboundCall
//!      │
//!      ▼
//! decode ── unreadable ─────────────────────────► 400 parse error
//!      │
//!      ▼
//! policy ── forbidden ──────────────────────────► method not allowed
//!      │
//!      ▼
//! auth gate ── wallet required, no user ────────► auth error
//!      │
//!      ▼
//! BackendRegistry (sticky per user, random for anonymous)
//!      │
//!      ▼
//! Caller: preflight ─► QueryCache / backend ─► postflight
//!      │
//!      ▼
//! metrics + error report ───────────────────────► ProxyReply
//! ```

pub mod caller;
pub mod errors;
pub mod reporting;
pub mod service;

pub use caller::Caller;
pub use errors::{FailureKind, ProxyError};
pub use reporting::{ErrorReport, ErrorReporter, SharedReporter, TracingErrorReporter};
pub use service::{InboundCall, ProxyReply, ProxyService, ProxyServiceBuilder};
