//! Wiring of the core components from an [`AppConfig`].

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info};
use walletgate_core::{
    audit::{AuditSink, TracingAuditSink},
    auth::{CachingResolver, MethodPolicyTable, RemoteUserResolver, StaticTokenResolver, UserResolver},
    backend::{BackendRegistry, HttpClient, HttpClientConfig},
    cache::{CachePolicy, QueryCache},
    config::AppConfig,
    hooks::{builtin, HookRegistry},
    metrics::MetricsCollector,
    proxy::ProxyService,
};

/// Everything `main` and the router need, built once at startup.
pub struct CoreServices {
    pub service: Arc<ProxyService>,
    pub registry: Arc<BackendRegistry>,
    pub cache: Option<Arc<QueryCache>>,
    pub resolver_cache: Option<Arc<CachingResolver>>,
    pub metrics: Option<MetricsCollector>,
}

impl CoreServices {
    /// # Errors
    ///
    /// Fails on an invalid cache configuration, an unknown hook name, or if an HTTP client
    /// cannot be built.
    pub fn build(config: &AppConfig) -> Result<Self> {
        Self::build_with_audit(config, Arc::new(TracingAuditSink))
    }

    /// Like [`build`](Self::build), with audit records sent to `audit_sink`.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    pub fn build_with_audit(config: &AppConfig, audit_sink: Arc<dyn AuditSink>) -> Result<Self> {
        let metrics = config.metrics.enabled.then(MetricsCollector::new);

        let registry = Arc::new(BackendRegistry::new(config.backends.servers.clone()));
        if let Some(metrics) = &metrics {
            metrics.record_backend_count(registry.len());
        }
        info!(backends = registry.len(), "backend registry initialized");

        let client = HttpClient::with_config(HttpClientConfig {
            concurrent_limit: config.server.max_concurrent_requests,
            ..HttpClientConfig::default()
        })
        .context("failed to build backend HTTP client")?;

        let mut hooks = builtin::install(HookRegistry::builder(), &config.hooks.enabled, &audit_sink)
            .map_err(|e| anyhow::anyhow!("hook configuration invalid: {e}"))?;
        if let Some(metrics) = &metrics {
            hooks = hooks.with_metrics(metrics.clone());
        }
        let hooks = hooks.build();
        debug!(hooks = hooks.len(), "hook registry built");

        let (resolver, resolver_cache) = build_resolver(config)?;

        let mut builder = ProxyService::builder(Arc::clone(&registry), Arc::new(client))
            .hooks(hooks)
            .policies(MethodPolicyTable::with_overrides(&config.auth.policies))
            .resolver(resolver)
            .timeout(config.request_timeout());

        let cache = if config.cache.enabled {
            let cache = Arc::new(
                QueryCache::from_config(&config.cache).context("cache configuration invalid")?,
            );
            builder = builder.cache(Arc::clone(&cache), CachePolicy::from_config(&config.cache));
            info!(
                max_entries = config.cache.max_entries,
                rules = config.cache.rules.len(),
                "response cache enabled"
            );
            Some(cache)
        } else {
            None
        };

        if let Some(metrics) = &metrics {
            builder = builder.metrics(metrics.clone());
        }

        Ok(Self { service: Arc::new(builder.build()), registry, cache, resolver_cache, metrics })
    }

    /// Starts the periodic sweeps of the response cache and the resolver cache.
    pub fn start_background_tasks(
        &self,
        config: &AppConfig,
        shutdown_tx: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if let Some(cache) = &self.cache {
            handles.push(cache.start_purge_task(config.cache.purge_interval(), shutdown_tx.subscribe()));
        }

        if let Some(resolver_cache) = &self.resolver_cache {
            let resolver_cache = Arc::clone(resolver_cache);
            let interval = config.auth.resolver_cache_ttl();
            let mut shutdown_rx = shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = ticker.tick() => resolver_cache.purge_expired(),
                    }
                }
            }));
        }

        handles
    }
}

fn build_resolver(
    config: &AppConfig,
) -> Result<(Arc<dyn UserResolver>, Option<Arc<CachingResolver>>)> {
    let base: Arc<dyn UserResolver> = match &config.auth.remote_resolver_url {
        Some(url) => {
            info!(url = %url, "using remote user resolver");
            Arc::new(
                RemoteUserResolver::new(url.clone(), config.auth.remote_resolver_timeout())
                    .context("failed to build remote user resolver")?,
            )
        }
        None => {
            info!(tokens = config.auth.static_tokens.len(), "using static token table");
            Arc::new(StaticTokenResolver::new(config.auth.static_tokens.clone()))
        }
    };

    if config.auth.resolver_cache_ttl_seconds == 0 {
        return Ok((base, None));
    }

    let caching = Arc::new(CachingResolver::new(base, config.auth.resolver_cache_ttl()));
    Ok((caching.clone(), Some(caching)))
}
