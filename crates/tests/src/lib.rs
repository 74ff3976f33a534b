//! Integration Tests for the Wallet Proxy
//!
//! Every test builds the proxy from an `AppConfig` the way the server binary does and drives
//! the axum router in-process, against mock SDK daemons listening on local ports.
//!
//! - `proxy_flow_tests`: id re-stamping, error pass-through, malformed input
//! - `single_flight_tests`: collapsing of concurrent identical calls, cache scoping
//! - `affinity_tests`: user-to-backend binding and rebinding on pool changes
//! - `auth_gate_tests`: static and remote token resolution, method policies
//! - `hook_tests`: preflight/postflight hooks and the audit trail
//! - `http_surface_tests`: CORS, request ids, `/health` and `/metrics`
//! - `mock_infrastructure`: reusable mock daemons and helpers
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod affinity_tests;


#[cfg(test)]
mod hook_tests;

#[cfg(test)]
mod http_surface_tests;

#[cfg(test)]
mod proxy_flow_tests;

#[cfg(test)]
mod single_flight_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
