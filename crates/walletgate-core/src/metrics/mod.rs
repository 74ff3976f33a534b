//! Prometheus metrics for the proxy.
//!
//! Every call produces exactly one `walletgate_call_duration_seconds` observation. Failed
//! calls additionally produce one `walletgate_call_failed_duration_seconds` observation
//! labelled with the failure kind. Recording is lock-free; the recorder is installed once per
//! process and rendered by the `/metrics` endpoint.
//!
//! Backend names are interned so the hot path does not allocate a label per call. The pool
//! only grows with configured backend names.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{
    borrow::Cow,
    sync::OnceLock,
    time::Duration,
};

use crate::{hooks::Phase, proxy::FailureKind, types::CacheStatus};

pub const CALL_DURATION: &str = "walletgate_call_duration_seconds";
pub const CALL_FAILED_DURATION: &str = "walletgate_call_failed_duration_seconds";
pub const CACHE_HITS: &str = "walletgate_cache_hits_total";
pub const CACHE_MISSES: &str = "walletgate_cache_misses_total";
pub const HOOK_FAILURES: &str = "walletgate_hook_failures_total";
pub const AUTH_RESULTS: &str = "walletgate_auth_results_total";
pub const BACKENDS: &str = "walletgate_backends";

/// Label used when a call failed before any backend was chosen.
pub const NO_BACKEND: &str = "none";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

static BACKEND_NAME_POOL: OnceLock<dashmap::DashMap<String, &'static str>> = OnceLock::new();

#[inline]
fn backend_to_static(backend: &str) -> Cow<'static, str> {
    if backend == NO_BACKEND {
        return Cow::Borrowed(NO_BACKEND);
    }

    let pool = BACKEND_NAME_POOL.get_or_init(dashmap::DashMap::new);
    if let Some(interned) = pool.get(backend) {
        return Cow::Borrowed(*interned);
    }

    let owned = backend.to_string();
    let leaked: &'static str = Box::leak(owned.clone().into_boxed_str());
    pool.insert(owned, leaked);
    Cow::Borrowed(leaked)
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "prometheus recorder already installed, using a detached recorder"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Records call, cache, auth and hook metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self { prometheus_handle: init_prometheus_recorder() }
    }

    /// The single timing observation of a call.
    pub fn record_call(&self, method: &str, backend: &str, elapsed: Duration) {
        histogram!(
            CALL_DURATION,
            "method" => method.to_string(),
            "backend" => backend_to_static(backend)
        )
        .record(elapsed.as_secs_f64());
    }

    /// The additional observation of a failed call.
    pub fn record_call_failure(
        &self,
        method: &str,
        backend: &str,
        kind: FailureKind,
        elapsed: Duration,
    ) {
        histogram!(
            CALL_FAILED_DURATION,
            "method" => method.to_string(),
            "backend" => backend_to_static(backend),
            "kind" => kind.as_str()
        )
        .record(elapsed.as_secs_f64());
    }

    pub fn record_cache_status(&self, method: &str, status: CacheStatus) {
        match status {
            CacheStatus::Hit => counter!(CACHE_HITS, "method" => method.to_string()).increment(1),
            CacheStatus::Miss => {
                counter!(CACHE_MISSES, "method" => method.to_string()).increment(1);
            }
            _ => {}
        }
    }

    pub fn record_hook_failure(&self, hook: &str, phase: Phase) {
        counter!(HOOK_FAILURES, "hook" => hook.to_string(), "phase" => phase.as_str()).increment(1);
    }

    pub fn record_auth_result(&self, result: &'static str) {
        counter!(AUTH_RESULTS, "result" => result).increment(1);
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_backend_count(&self, count: usize) {
        gauge!(BACKENDS).set(count as f64);
    }

    /// Prometheus text exposition of everything recorded so far.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus_handle.render()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
