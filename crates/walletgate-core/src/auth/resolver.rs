use async_trait::async_trait;
use dashmap::DashMap;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::auth::{ResolveError, User, UserId};

/// Turns a request's auth token into a user.
///
/// A missing or empty token is [`ResolveError::NoAuthInfo`]. `Ok(None)` means the token
/// identifies nobody, which the gate rejects as a failed authentication.
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve(&self, token: Option<&str>) -> Result<Option<User>, ResolveError>;
}

/// Resolver backed by a fixed token table, loaded from configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenResolver {
    #[must_use]
    pub fn new(tokens: HashMap<String, UserId>) -> Self {
        Self { tokens }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl UserResolver for StaticTokenResolver {
    async fn resolve(&self, token: Option<&str>) -> Result<Option<User>, ResolveError> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(ResolveError::NoAuthInfo),
        };

        self.tokens
            .get(token)
            .map(|id| Some(User::new(*id)))
            .ok_or_else(|| ResolveError::Invalid("unknown token".to_string()))
    }
}

struct CachedUser {
    user: User,
    cached_at: Instant,
}

/// Caches successful resolutions for a fixed TTL.
///
/// Only authenticated users are cached; rejections and outages always reach the inner
/// resolver again so a fixed token or a recovered auth service takes effect immediately.
pub struct CachingResolver {
    inner: Arc<dyn UserResolver>,
    cache: DashMap<String, CachedUser>,
    ttl: Duration,
}

impl CachingResolver {
    pub fn new(inner: Arc<dyn UserResolver>, ttl: Duration) -> Self {
        Self { inner, cache: DashMap::new(), ttl }
    }

    /// Drops expired entries.
    pub fn purge_expired(&self) {
        self.cache.retain(|_, cached| cached.cached_at.elapsed() < self.ttl);
    }

    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl UserResolver for CachingResolver {
    async fn resolve(&self, token: Option<&str>) -> Result<Option<User>, ResolveError> {
        let Some(key) = token.filter(|t| !t.is_empty()) else {
            return self.inner.resolve(token).await;
        };

        if let Some(cached) = self.cache.get(key) {
            if cached.cached_at.elapsed() < self.ttl {
                return Ok(Some(cached.user.clone()));
            }
        }

        let resolved = self.inner.resolve(token).await?;
        if let Some(user) = &resolved {
            self.cache
                .insert(key.to_string(), CachedUser { user: user.clone(), cached_at: Instant::now() });
        }
        Ok(resolved)
    }
}
