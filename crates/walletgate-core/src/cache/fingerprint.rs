//! Cache keys for JSON-RPC calls.
//!
//! A fingerprint is `(method, scope, params)`. Params are normalized first: absent, `null`,
//! `{}` and `[]` are all "no params". The key hashes params structurally (object keys
//! sorted, every JSON type prefixed with a discriminant) instead of serializing them, and
//! equality compares the normalized values so two different param sets never share an entry
//! even if their hashes collide.

use ahash::AHasher;
use serde_json::Value;
use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::auth::UserId;

/// Identity of a cacheable call.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    method: Arc<str>,
    scope: Option<UserId>,
    params: Option<Arc<Value>>,
    params_hash: u64,
}

impl Fingerprint {
    /// Builds the key for `method` called with `params`, scoped to `scope` when present.
    #[must_use]
    pub fn new(method: &str, params: Option<&Value>, scope: Option<UserId>) -> Self {
        let params = normalize(params).map(|p| Arc::new(p.clone()));
        let params_hash = params.as_deref().map_or(0, |p| {
            let mut hasher = AHasher::default();
            hash_json_value(p, &mut hasher);
            hasher.finish()
        });
        Self { method: Arc::from(method), scope, params, params_hash }
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn scope(&self) -> Option<UserId> {
        self.scope
    }

    #[must_use]
    pub fn params_hash(&self) -> u64 {
        self.params_hash
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.params_hash == other.params_hash &&
            self.scope == other.scope &&
            self.method == other.method &&
            self.params == other.params
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.method.hash(state);
        self.scope.hash(state);
        self.params_hash.hash(state);
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Some(user) => write!(f, "{}@{}#{:016x}", self.method, user, self.params_hash),
            None => write!(f, "{}#{:016x}", self.method, self.params_hash),
        }
    }
}

fn normalize(params: Option<&Value>) -> Option<&Value> {
    match params {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(Value::Array(items)) if items.is_empty() => None,
        Some(value) => Some(value),
    }
}

/// Hashes a JSON value by walking it. Object keys are visited in sorted order so key order
/// never changes the result.
fn hash_json_value(value: &Value, hasher: &mut impl Hasher) {
    match value {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Number(n) => {
            2u8.hash(hasher);
            if let Some(i) = n.as_i64() {
                0u8.hash(hasher);
                i.hash(hasher);
            } else if let Some(u) = n.as_u64() {
                1u8.hash(hasher);
                u.hash(hasher);
            } else if let Some(f) = n.as_f64() {
                2u8.hash(hasher);
                f.to_bits().hash(hasher);
            }
        }
        Value::String(s) => {
            3u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Array(items) => {
            4u8.hash(hasher);
            items.len().hash(hasher);
            for item in items {
                hash_json_value(item, hasher);
            }
        }
        Value::Object(map) => {
            5u8.hash(hasher);
            map.len().hash(hasher);
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for key in keys {
                key.hash(hasher);
                if let Some(value) = map.get(key) {
                    hash_json_value(value, hasher);
                }
            }
        }
    }
}
