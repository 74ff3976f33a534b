//! SDK daemon pool and the HTTP client used to reach it.
//!
//! - [`BackendRegistry`]: live backend set plus sticky user → backend bindings
//! - [`HttpClient`]: shared, bounded JSON-RPC client; never retries
//! - [`BackendError`]: transport-level failures, cloneable so one failure can be handed to
//!   every caller sharing a computation

pub mod errors;
pub mod http_client;
pub mod registry;

pub use errors::BackendError;
pub use http_client::{HttpClient, HttpClientConfig};
pub use registry::{Backend, BackendRegistry};
