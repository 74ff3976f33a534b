//! HTTP front end of the walletgate proxy.

pub mod middleware;
pub mod router;
pub mod services;

pub use router::{create_app, AppState};
pub use services::CoreServices;
