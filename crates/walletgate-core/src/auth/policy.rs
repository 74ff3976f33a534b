use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{MatcherTable, MethodMatcher};

/// Parameters that turn an otherwise public query into a wallet-scoped one.
const WALLET_SCOPED_FLAGS: &[&str] = &["include_purchase_receipt", "include_is_my_output"];

/// How a method relates to user wallets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodPolicy {
    /// Public, never user-scoped.
    Anonymous,
    /// Public, but uses the caller's wallet when one is authenticated.
    AcceptsWallet,
    /// Only callable by an authenticated user.
    RequiresWallet,
    /// Daemon administration; never proxied.
    Forbidden,
}

/// Startup-built classification of every method the proxy may see.
///
/// Methods that match no entry are [`MethodPolicy::Anonymous`].
#[derive(Debug, Clone)]
pub struct MethodPolicyTable {
    table: MatcherTable<MethodPolicy>,
}

impl Default for MethodPolicyTable {
    fn default() -> Self {
        let forbidden = [
            "stop",
            "account_add",
            "account_create",
            "account_encrypt",
            "account_decrypt",
            "account_lock",
            "account_unlock",
            "account_remove",
            "wallet_add",
            "wallet_create",
            "wallet_encrypt",
            "wallet_decrypt",
            "wallet_lock",
            "wallet_unlock",
            "wallet_remove",
            "settings_set",
            "settings_clear",
        ];
        let wallet_prefixes = [
            "wallet_",
            "account_",
            "address_",
            "channel_",
            "collection_",
            "preference_",
            "purchase_",
            "stream_",
            "support_",
            "sync_",
            "transaction_",
            "txo_",
            "utxo_",
        ];
        let wallet_methods = ["publish", "get", "file_list", "file_delete"];
        let accepts_wallet = ["resolve", "claim_search"];

        let mut table = MatcherTable::new();
        for prefix in wallet_prefixes {
            table.insert(MethodMatcher::prefix(prefix), MethodPolicy::RequiresWallet);
        }
        for method in wallet_methods {
            table.insert(MethodMatcher::exact(method), MethodPolicy::RequiresWallet);
        }
        for method in accepts_wallet {
            table.insert(MethodMatcher::exact(method), MethodPolicy::AcceptsWallet);
        }
        for method in forbidden {
            table.insert(MethodMatcher::exact(method), MethodPolicy::Forbidden);
        }
        // Read-only status probes stay public even under a wallet prefix.
        table.insert(MethodMatcher::exact("wallet_status"), MethodPolicy::Anonymous);

        Self { table }
    }
}

impl MethodPolicyTable {
    /// An empty table: every method is anonymous.
    #[must_use]
    pub fn empty() -> Self {
        Self { table: MatcherTable::new() }
    }

    /// Compiled defaults with configured overrides applied on top.
    #[must_use]
    pub fn with_overrides(overrides: &HashMap<MethodMatcher, MethodPolicy>) -> Self {
        let mut policies = Self::default();
        for (matcher, policy) in overrides {
            policies.set(matcher.clone(), *policy);
        }
        policies
    }

    pub fn set(&mut self, matcher: MethodMatcher, policy: MethodPolicy) {
        self.table.insert(matcher, policy);
    }

    #[must_use]
    pub fn policy(&self, method: &str) -> MethodPolicy {
        self.table.lookup(method).copied().unwrap_or(MethodPolicy::Anonymous)
    }

    /// True when the call must be authenticated.
    ///
    /// Accepts-wallet methods become wallet-requiring when any wallet-scoped flag in
    /// `params` is set to `true`.
    #[must_use]
    pub fn requires_wallet(&self, method: &str, params: Option<&serde_json::Value>) -> bool {
        match self.policy(method) {
            MethodPolicy::RequiresWallet => true,
            MethodPolicy::AcceptsWallet => params.is_some_and(|params| {
                WALLET_SCOPED_FLAGS
                    .iter()
                    .any(|flag| params.get(*flag).and_then(serde_json::Value::as_bool) == Some(true))
            }),
            MethodPolicy::Anonymous | MethodPolicy::Forbidden => false,
        }
    }

    #[must_use]
    pub fn accepts_wallet(&self, method: &str) -> bool {
        matches!(self.policy(method), MethodPolicy::AcceptsWallet | MethodPolicy::RequiresWallet)
    }

    #[must_use]
    pub fn is_forbidden(&self, method: &str) -> bool {
        self.policy(method) == MethodPolicy::Forbidden
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
