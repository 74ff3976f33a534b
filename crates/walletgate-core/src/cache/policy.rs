use std::time::Duration;

use crate::{
    auth::UserId,
    cache::{
        config::{CacheConfig, CacheRule, CacheScope},
        Fingerprint,
    },
    types::{JsonRpcRequest, MatcherTable, MethodMatcher},
};

/// Decides which calls are cacheable, for how long and under which key.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    rules: MatcherTable<CacheRule>,
    default_ttl: Duration,
}

impl CachePolicy {
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self { rules: MatcherTable::new(), default_ttl }
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut policy = Self::new(Duration::from_secs(config.default_ttl_seconds));
        for (matcher, rule) in &config.rules {
            policy.add_rule(matcher.clone(), *rule);
        }
        policy
    }

    pub fn add_rule(&mut self, matcher: MethodMatcher, rule: CacheRule) {
        self.rules.insert(matcher, rule);
    }

    #[must_use]
    pub fn rule_for(&self, method: &str) -> Option<&CacheRule> {
        self.rules.lookup(method)
    }

    /// Cache key and TTL for `request`, or `None` if the method is not cacheable.
    ///
    /// A request made on behalf of a user is always keyed to that user, whatever the rule's
    /// scope. Per-user rules never cache anonymous calls.
    #[must_use]
    pub fn fingerprint(
        &self,
        request: &JsonRpcRequest,
        user: Option<UserId>,
    ) -> Option<(Fingerprint, Duration)> {
        let rule = self.rule_for(&request.method)?;
        let ttl = rule.ttl_seconds.map_or(self.default_ttl, Duration::from_secs);
        if ttl.is_zero() {
            return None;
        }

        if rule.scope == CacheScope::PerUser && user.is_none() {
            return None;
        }
        Some((Fingerprint::new(&request.method, request.params.as_ref(), user), ttl))
    }
}
