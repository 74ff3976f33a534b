//! Mock Infrastructure for Testing the Wallet Proxy
//!
//! Reusable backends and helpers for driving the proxy without real SDK daemons.
//!
//! ## Components
//!
//! - `SdkMockBuilder`: wraps mockito with SDK-shaped responses
//! - `CountingBackend`: in-process daemon with optional delay and per-method call counts
//! - Test helpers for building the app from configuration and sending JSON-RPC calls
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{config_for, CountingBackend, TestApp};
//!
//! let backend = CountingBackend::start("sdk-a").await;
//! let app = TestApp::new(&config_for(&[backend.url()]));
//! ```

pub mod test_helpers;

pub use counting_backend::CountingBackend;
pub use sdk_mock::SdkMockBuilder;
pub use test_helpers::*;
