//! Configuration and error types for the query cache.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use thiserror::Error;

use crate::types::MethodMatcher;

/// Errors raised while building the cache from configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// `max_entries` was zero while the cache is enabled.
    #[error("cache capacity must be greater than 0")]
    ZeroCapacity,

    /// A rule would produce entries that expire immediately.
    #[error("cache rule for {matcher} has a zero TTL")]
    ZeroTtl { matcher: String },
}

/// Whether a cached result may be shared between users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// One entry for everyone. Becomes per-user when the request carries a user.
    #[default]
    Global,
    /// One entry per user; anonymous calls are not cached.
    PerUser,
}

/// Caching behavior for the methods matched by one matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRule {
    /// Entry lifetime. Falls back to [`CacheConfig::default_ttl_seconds`] when omitted.
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    pub scope: CacheScope,
}

impl CacheRule {
    #[must_use]
    pub fn global(ttl_seconds: u64) -> Self {
        Self { ttl_seconds: Some(ttl_seconds), scope: CacheScope::Global }
    }

    #[must_use]
    pub fn per_user(ttl_seconds: u64) -> Self {
        Self { ttl_seconds: Some(ttl_seconds), scope: CacheScope::PerUser }
    }
}

/// Query cache settings.
///
/// Methods without a rule are never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// TTL for rules that do not set their own. Defaults to 5 seconds.
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,

    /// Upper bound on stored entries. Defaults to 10 000.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// How often expired entries are swept. Defaults to 30 seconds.
    #[serde(default = "default_purge_interval_seconds")]
    pub purge_interval_seconds: u64,

    #[serde(default = "default_rules")]
    pub rules: HashMap<MethodMatcher, CacheRule>,
}

fn default_enabled() -> bool {
    true
}

fn default_ttl_seconds() -> u64 {
    5
}

fn default_max_entries() -> usize {
    10_000
}

fn default_purge_interval_seconds() -> u64 {
    30
}

fn default_rules() -> HashMap<MethodMatcher, CacheRule> {
    HashMap::from([
        (MethodMatcher::exact("status"), CacheRule::global(5)),
        (MethodMatcher::exact("version"), CacheRule::global(60)),
        (MethodMatcher::exact("ffmpeg_find"), CacheRule::global(60)),
        (MethodMatcher::exact("resolve"), CacheRule::global(30)),
        (MethodMatcher::exact("claim_search"), CacheRule::global(30)),
        (MethodMatcher::exact("wallet_balance"), CacheRule::per_user(3)),
    ])
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_ttl_seconds: default_ttl_seconds(),
            max_entries: default_max_entries(),
            purge_interval_seconds: default_purge_interval_seconds(),
            rules: default_rules(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_seconds.max(1))
    }

    /// # Errors
    ///
    /// Returns a [`CacheError`] for a zero capacity or a rule with a zero TTL.
    pub fn validate(&self) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        if self.max_entries == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        for (matcher, rule) in &self.rules {
            if rule.ttl_seconds.unwrap_or(self.default_ttl_seconds) == 0 {
                return Err(CacheError::ZeroTtl { matcher: matcher.to_string() });
            }
        }
        Ok(())
    }
}
