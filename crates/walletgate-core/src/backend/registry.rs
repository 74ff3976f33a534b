use ahash::RandomState;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::{auth::UserId, backend::BackendError};

/// A single SDK daemon instance.
///
/// Identity is its address; the name only shows up in logs and metric labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Backend {
    pub name: String,
    pub url: String,
}

impl Backend {
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { name: name.into(), url: url.into() }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Live backend pool plus the sticky user-to-backend assignments.
///
/// The pool is read on every request and replaced rarely, so it lives in an `ArcSwap` and
/// readers never take a lock. Bindings are kept in a sharded map so unrelated users never
/// contend with each other.
pub struct BackendRegistry {
    backends: ArcSwap<Vec<Arc<Backend>>>,
    bindings: DashMap<UserId, Arc<Backend>, RandomState>,
}

impl BackendRegistry {
    #[must_use]
    pub fn new(backends: Vec<Backend>) -> Self {
        Self {
            backends: ArcSwap::from_pointee(backends.into_iter().map(Arc::new).collect()),
            bindings: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Snapshot of the live pool.
    #[must_use]
    pub fn current_backends(&self) -> Arc<Vec<Arc<Backend>>> {
        self.backends.load_full()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.load().is_empty()
    }

    /// Uniformly picks one live backend.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NoBackends`] if the pool is empty.
    pub fn pick_random(&self) -> Result<Arc<Backend>, BackendError> {
        let backends = self.backends.load();
        if backends.is_empty() {
            tracing::error!("backend pool is empty");
            return Err(BackendError::NoBackends);
        }
        let index = rand::rng().random_range(0..backends.len());
        Ok(Arc::clone(&backends[index]))
    }

    #[must_use]
    pub fn binding_for(&self, user: UserId) -> Option<Arc<Backend>> {
        self.bindings.get(&user).map(|entry| Arc::clone(entry.value()))
    }

    /// Records a sticky assignment. Rebinding to the same backend is a no-op; rebinding to a
    /// different one overwrites the previous assignment.
    pub fn bind(&self, user: UserId, backend: Arc<Backend>) {
        if let Some(previous) = self.bindings.insert(user, Arc::clone(&backend)) {
            if previous != backend {
                tracing::info!(
                    user_id = user,
                    from = %previous,
                    to = %backend,
                    "user rebound to a different backend"
                );
            }
        }
    }

    /// Returns the user's sticky backend, assigning a random one on first use.
    ///
    /// Concurrent first calls for the same user agree on a single backend. A binding that
    /// points outside the live pool is discarded and reassigned.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NoBackends`] if the user is unbound and the pool is empty.
    pub fn backend_for_user(&self, user: UserId) -> Result<Arc<Backend>, BackendError> {
        loop {
            let bound = match self.binding_for(user) {
                Some(bound) => bound,
                None => {
                    let candidate = self.pick_random()?;
                    let entry = self.bindings.entry(user).or_insert_with(|| {
                        tracing::debug!(user_id = user, backend = %candidate, "assigned backend to user");
                        Arc::clone(&candidate)
                    });
                    Arc::clone(entry.value())
                }
            };

            if self.is_live(&bound) {
                return Ok(bound);
            }
            // picked from a pool that was swapped out meanwhile
            self.bindings.remove_if(&user, |_, current| *current == bound);
        }
    }

    fn is_live(&self, backend: &Arc<Backend>) -> bool {
        self.backends.load().iter().any(|live| live == backend)
    }

    /// Swaps in a new live pool.
    ///
    /// Bindings that point at a backend no longer in the pool are dropped; those users get a
    /// fresh assignment on their next call. The pool is published before bindings are pruned,
    /// so an assignment racing with the swap is either pruned here or caught by
    /// [`Self::backend_for_user`].
    pub fn replace_backends(&self, backends: Vec<Backend>) {
        let next: Arc<Vec<Arc<Backend>>> = Arc::new(backends.into_iter().map(Arc::new).collect());
        self.backends.store(Arc::clone(&next));

        let before = self.bindings.len();
        self.bindings.retain(|_, bound| next.iter().any(|b| b == bound));
        let dropped = before.saturating_sub(self.bindings.len());

        tracing::info!(backends = next.len(), dropped_bindings = dropped, "backend pool replaced");
    }

    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}
