//! Response cache for read-mostly SDK methods.
//!
//! # Components
//!
//! - [`CachePolicy`]: method → [`CacheRule`] table deciding TTL and key scope
//! - [`Fingerprint`]: normalized `(method, user scope, params)` key
//! - [`QueryCache`]: TTL store with per-key single-flight, so N concurrent identical misses
//!   cost one backend call
//!
//! ```text
//! request ──> CachePolicy::fingerprint ──> None ──────────────> backend (BYPASS)
//!                     │
//!                     └─> (key, ttl) ──> QueryCache::get_or_compute
//!                                            ├─ fresh entry ─────────> HIT
//!                                            ├─ in flight ──> wait ──> shared result (MISS)
//!                                            └─ leader ───> backend ─> store if ok (MISS)
//! ```

pub mod config;
pub mod fingerprint;
pub mod policy;
pub mod query_cache;

pub use config::{CacheConfig, CacheError, CacheRule, CacheScope};
pub use fingerprint::Fingerprint;
pub use policy::CachePolicy;
pub use query_cache::{CacheStats, QueryCache, SharedResult};
