//! Core type definitions shared across the proxy.
//!
//! # Type Categories
//!
//! ## JSON-RPC Protocol Types
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: wire shapes exchanged with
//!   clients and with the SDK daemons
//! - [`CacheStatus`]: proxy extension reported through the `x-cache-status` header
//!
//! ## Method Classification
//! - [`MethodMatcher`]: exact name, prefix (`wallet_*`) or wildcard (`*`)
//! - [`MatcherTable`]: startup-built classification table consulted by exact/prefix lookup

use serde::{Deserialize, Deserializer, Serialize};
use std::{borrow::Cow, fmt, sync::Arc};

/// JSON-RPC protocol version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the JSON-RPC version.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Describes how a response was produced.
///
/// # Example
///
/// ```
/// use walletgate_core::types::CacheStatus;
///
/// assert_eq!(CacheStatus::Hit.to_string(), "HIT");
/// assert_eq!(CacheStatus::Bypass.to_string(), "BYPASS");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CacheStatus {
    /// Served from a fresh cache entry.
    Hit,
    /// Computed by a backend call (possibly shared with concurrent identical requests).
    Miss,
    /// The method is not cacheable or no cache is attached.
    Bypass,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
            Self::Bypass => write!(f, "BYPASS"),
        }
    }
}

/// JSON-RPC 2.0 request.
///
/// `id` is an `Arc` so that error envelopes and re-stamped cached responses can share it
/// without deep-copying the JSON value.
///
/// # Example
///
/// ```
/// use walletgate_core::types::JsonRpcRequest;
/// use serde_json::json;
///
/// let request = JsonRpcRequest::new("status", None, json!(1));
/// assert_eq!(request.method, "status");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub id: Arc<serde_json::Value>,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        params: Option<serde_json::Value>,
        id: serde_json::Value,
    ) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, method: method.into(), params, id: Arc::new(id) }
    }

    /// Looks up a named parameter when params are passed as an object.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&serde_json::Value> {
        self.params.as_ref().and_then(|p| p.get(name))
    }
}

/// JSON-RPC 2.0 response.
///
/// A response carries either `result` or `error`. A present `"result": null` is kept as
/// `Some(Value::Null)` so that decoding and re-encoding a well-formed response is lossless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Arc<serde_json::Value>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(result: serde_json::Value, id: Arc<serde_json::Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: Some(result), error: None, id }
    }

    #[must_use]
    pub fn error(code: i32, message: impl Into<String>, id: Arc<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
            id,
        }
    }

    /// True when the backend (or a hook) reported a JSON-RPC level error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns a copy answering a different request id.
    #[must_use]
    pub fn with_id(mut self, id: Arc<serde_json::Value>) -> Self {
        self.id = id;
        self
    }
}

/// JSON-RPC 2.0 error object.
///
/// Standard codes: `-32700` parse error, `-32600` invalid request, `-32601` method not found,
/// `-32602` invalid params, `-32603` internal error. The proxy additionally uses `-32080`
/// (proxy internal), `-32084` (auth required) and `-32085` (forbidden).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Selects the methods a hook, cache rule or auth policy applies to.
///
/// Parsed from its textual form: `"*"` matches every method, a trailing `*` makes a prefix
/// matcher (`"wallet_*"`), anything else is an exact name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MethodMatcher {
    Any,
    Exact(String),
    Prefix(String),
}

impl MethodMatcher {
    #[must_use]
    pub fn exact(method: impl Into<String>) -> Self {
        Self::Exact(method.into())
    }

    #[must_use]
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    #[must_use]
    pub fn matches(&self, method: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(name) => name == method,
            Self::Prefix(prefix) => method.starts_with(prefix.as_str()),
        }
    }

    /// Ranking used by [`MatcherTable`]: exact beats any prefix, longer prefixes beat shorter
    /// ones, the wildcard ranks last.
    fn specificity(&self) -> usize {
        match self {
            Self::Any => 0,
            Self::Prefix(prefix) => 1 + prefix.len(),
            Self::Exact(_) => usize::MAX,
        }
    }
}

impl TryFrom<String> for MethodMatcher {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for MethodMatcher {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("method matcher cannot be empty".to_string());
        }
        if s == "*" {
            return Ok(Self::Any);
        }
        match s.strip_suffix('*') {
            Some(prefix) if prefix.contains('*') => Err(format!("invalid method matcher: {s}")),
            Some(prefix) => Ok(Self::Prefix(prefix.to_string())),
            None if s.contains('*') => Err(format!("invalid method matcher: {s}")),
            None => Ok(Self::Exact(s.to_string())),
        }
    }
}

impl From<MethodMatcher> for String {
    fn from(matcher: MethodMatcher) -> Self {
        matcher.to_string()
    }
}

impl fmt::Display for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(name) => write!(f, "{name}"),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
        }
    }
}

/// Classification table mapping method matchers to a policy value.
///
/// Later inserts with the same matcher replace earlier ones, which is how configuration
/// overrides compiled defaults. Lookup returns the most specific matching entry.
#[derive(Debug, Clone)]
pub struct MatcherTable<T> {
    entries: Vec<(MethodMatcher, T)>,
}

impl<T> Default for MatcherTable<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> MatcherTable<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, matcher: MethodMatcher, value: T) {
        if let Some(slot) = self.entries.iter_mut().find(|(m, _)| *m == matcher) {
            slot.1 = value;
        } else {
            self.entries.push((matcher, value));
        }
    }

    #[must_use]
    pub fn lookup(&self, method: &str) -> Option<&T> {
        self.entries
            .iter()
            .filter(|(matcher, _)| matcher.matches(method))
            .max_by_key(|(matcher, _)| matcher.specificity())
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(MethodMatcher, T)> {
        self.entries.iter()
    }
}

impl<T> FromIterator<(MethodMatcher, T)> for MatcherTable<T> {
    fn from_iter<I: IntoIterator<Item = (MethodMatcher, T)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (matcher, value) in iter {
            table.insert(matcher, value);
        }
        table
    }
}
