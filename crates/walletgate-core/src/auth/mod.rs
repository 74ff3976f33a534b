//! Authentication gate for wallet-scoped methods.
//!
//! The proxy never verifies tokens itself. A [`UserResolver`](resolver::UserResolver) turns the
//! request's auth token into a [`User`], and the method classification table in [`policy`]
//! decides whether the method needs one.
//!
//! # Gate Decision
//!
//! ```text
//!   method ──> MethodPolicyTable ──> Forbidden ──────────────> client error
//!                    │
//!                    ├──> Anonymous ──> proceed, no user; a resolvable token still
//!                    │                  picks the user's backend
//!                    │
//!                    └──> Accepts/RequiresWallet
//!                              │
//!                              └──> resolver.resolve(token) ──> classify()
//!                                        │
//!                                        ├─ Authenticated(user) ──> proceed as user
//!                                        ├─ NoAuthInfo ──> requires? AuthRequired : anonymous
//!                                        └─ Failed(why) ─> requires? AuthForbidden : anonymous
//! ```
//!
//! # Resolvers
//!
//! - [`StaticTokenResolver`](resolver::StaticTokenResolver): token table from configuration
//! - [`RemoteUserResolver`](remote::RemoteUserResolver): asks an external auth service
//! - [`CachingResolver`](resolver::CachingResolver): TTL cache in front of either

pub mod policy;
pub mod remote;
pub mod resolver;

pub use policy::{MethodPolicy, MethodPolicyTable};
pub use remote::RemoteUserResolver;
pub use resolver::{CachingResolver, StaticTokenResolver, UserResolver};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::proxy::ProxyError;

/// Numeric identity of an authenticated user. `0` never identifies a real user.
pub type UserId = u64;

/// An authenticated user as reported by a [`UserResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
}

impl User {
    #[must_use]
    pub fn new(id: UserId) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.id == 0
    }
}

/// Failure modes of a [`UserResolver`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The request carried no credentials at all.
    #[error("no authentication info")]
    NoAuthInfo,

    /// Credentials were present but rejected.
    #[error("invalid credentials: {0}")]
    Invalid(String),

    /// The authority could not be consulted.
    #[error("auth service unavailable: {0}")]
    Unavailable(String),
}

const MUST_AUTHENTICATE: &str = "must authenticate";

/// Result of authenticating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    NoAuthInfo,
    Failed(String),
    Authenticated(User),
}

impl AuthOutcome {
    /// Folds a resolver result into the three outcomes the gate acts on.
    ///
    /// Only [`ResolveError::NoAuthInfo`] means no credentials were presented. A resolver that
    /// reports no error yet yields no user (or the anonymous user) saw credentials it could not
    /// tie to anyone, so that counts as a failure.
    #[must_use]
    pub fn classify(result: Result<Option<User>, ResolveError>) -> Self {
        match result {
            Ok(Some(user)) if !user.is_anonymous() => Self::Authenticated(user),
            Ok(_) => Self::Failed(MUST_AUTHENTICATE.to_string()),
            Err(ResolveError::NoAuthInfo) => Self::NoAuthInfo,
            Err(ResolveError::Invalid(reason) | ResolveError::Unavailable(reason)) => {
                Self::Failed(reason)
            }
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// The error returned to the client when a wallet-requiring method was not authenticated.
    ///
    /// Returns `None` for [`AuthOutcome::Authenticated`].
    #[must_use]
    pub fn into_gate_error(self) -> Option<ProxyError> {
        match self {
            Self::NoAuthInfo => Some(ProxyError::AuthRequired),
            Self::Failed(reason) => Some(ProxyError::AuthForbidden(reason)),
            Self::Authenticated(_) => None,
        }
    }
}
