use ahash::RandomState;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, trace};

use crate::{
    backend::BackendError,
    cache::{CacheConfig, CacheError, Fingerprint},
    types::{CacheStatus, JsonRpcResponse},
};

/// Outcome of one backend computation, shared by every caller waiting on it.
pub type SharedResult = Result<JsonRpcResponse, BackendError>;

type InflightSlot = watch::Receiver<Option<SharedResult>>;

struct CacheEntry {
    response: JsonRpcResponse,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub inflight: usize,
}

/// Removes the in-flight marker when the leader finishes or is cancelled.
///
/// Declared after the leader's `watch::Sender` so the marker is gone before waiters are woken
/// by the sender being dropped.
struct InflightGuard<'a> {
    inflight: &'a DashMap<Fingerprint, InflightSlot, RandomState>,
    fingerprint: &'a Fingerprint,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.remove(self.fingerprint);
    }
}

enum Role {
    Leader(watch::Sender<Option<SharedResult>>),
    Waiter(InflightSlot),
}

/// TTL cache of backend responses with per-key single-flight.
///
/// # Single-flight
///
/// The first caller to miss a key becomes the leader: it registers an in-flight marker
/// holding a `watch` channel and runs the computation. Callers that miss while the marker
/// exists subscribe to the channel and receive a clone of the leader's result, success or
/// failure. If the leader is cancelled its guard removes the marker, the channel closes and a
/// waiter takes over as the next leader.
///
/// Only error-free responses are stored. RPC error responses and transport failures are still
/// handed to the waiters of that round.
pub struct QueryCache {
    entries: DashMap<Fingerprint, CacheEntry, RandomState>,
    inflight: DashMap<Fingerprint, InflightSlot, RandomState>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
            inflight: DashMap::with_hasher(RandomState::new()),
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// # Errors
    ///
    /// Returns a [`CacheError`] if the configuration is invalid.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        Ok(Self::new(config.max_entries))
    }

    /// Fresh entry for `fingerprint`, recorded as a hit or a miss.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<JsonRpcResponse> {
        let found = self.fresh(fingerprint);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    fn fresh(&self, fingerprint: &Fingerprint) -> Option<JsonRpcResponse> {
        let now = Instant::now();
        {
            let entry = self.entries.get(fingerprint)?;
            if entry.is_fresh(now) {
                return Some(entry.response.clone());
            }
        }
        self.entries.remove_if(fingerprint, |_, entry| !entry.is_fresh(now));
        None
    }

    /// Stores a response. Responses carrying a JSON-RPC error are ignored.
    ///
    /// When the cache is full, expired entries are purged first; if it is still full the
    /// response is not stored.
    pub fn insert(&self, fingerprint: Fingerprint, response: JsonRpcResponse, ttl: Duration) {
        if response.is_error() || ttl.is_zero() {
            return;
        }

        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&fingerprint) {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                debug!(fingerprint = %fingerprint, max_entries = self.max_entries, "cache full, entry not stored");
                return;
            }
        }

        trace!(fingerprint = %fingerprint, ttl_ms = ttl.as_millis() as u64, "cache insert");
        self.entries.insert(fingerprint, CacheEntry { response, expires_at: Instant::now() + ttl });
    }

    /// Returns a fresh cached response or computes it, sharing the computation with every
    /// concurrent caller for the same fingerprint.
    ///
    /// `timeout` bounds the whole call, including time spent waiting on another caller's
    /// computation.
    ///
    /// # Errors
    ///
    /// Returns the computation's error (the same one to every waiter), or
    /// [`BackendError::Timeout`] if no result arrived in time.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        ttl: Duration,
        timeout: Duration,
        compute: F,
    ) -> Result<(JsonRpcResponse, CacheStatus), BackendError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SharedResult>,
    {
        if let Some(response) = self.lookup(fingerprint) {
            return Ok((response, CacheStatus::Hit));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let role = match self.inflight.entry(fingerprint.clone()) {
                Entry::Occupied(slot) => Role::Waiter(slot.get().clone()),
                Entry::Vacant(slot) => {
                    let (tx, rx) = watch::channel(None);
                    slot.insert(rx);
                    Role::Leader(tx)
                }
            };

            match role {
                Role::Leader(tx) => {
                    let _guard = InflightGuard { inflight: &self.inflight, fingerprint };

                    // a previous leader may have stored the entry between our miss and our claim
                    if let Some(response) = self.fresh(fingerprint) {
                        tx.send_replace(Some(Ok(response.clone())));
                        return Ok((response, CacheStatus::Hit));
                    }

                    let result = tokio::time::timeout_at(deadline, compute())
                        .await
                        .unwrap_or(Err(BackendError::Timeout));

                    if let Ok(response) = &result {
                        self.insert(fingerprint.clone(), response.clone(), ttl);
                    }
                    tx.send_replace(Some(result.clone()));
                    return result.map(|response| (response, CacheStatus::Miss));
                }
                Role::Waiter(mut rx) => {
                    trace!(fingerprint = %fingerprint, "waiting on in-flight computation");
                    let shared = match tokio::time::timeout_at(deadline, rx.wait_for(Option::is_some)).await {
                        Err(_) => return Err(BackendError::Timeout),
                        Ok(Ok(value)) => value.clone(),
                        Ok(Err(_)) => None,
                    };

                    match shared {
                        Some(result) => return result.map(|response| (response, CacheStatus::Miss)),
                        // leader went away without a result; retry, possibly as the new leader
                        None => {
                            tokio::task::yield_now().await;
                        }
                    }
                }
            }
        }
    }

    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.remove(fingerprint).is_some()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
            inflight: self.inflight.len(),
        }
    }

    /// Spawns the periodic expiry sweep. Runs until `shutdown_rx` fires.
    pub fn start_purge_task(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => {
                        debug!("cache purge task received shutdown signal");
                        break;
                    }

                    _ = ticker.tick() => {
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            debug!(removed, remaining = cache.len(), "purged expired cache entries");
                        }
                    }
                }
            }

            info!("cache purge task stopped");
        })
    }
}
