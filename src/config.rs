//! Process configuration read from the environment.
//!
//! Lookups go through a function so tests never touch global state.

use std::time::Duration;

/// Lease used for leader election.
pub const LEASE_NAME: &str = "memcached-operator-leader";
/// How long a lease stays valid without renewal.
pub const LEASE_TTL: Duration = Duration::from_secs(15);
/// How often the leader renews, and how often followers retry.
pub const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);
/// Time given to in-flight reconciliations after a shutdown signal.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Settings the operator binary needs before it can start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Leader-election identity (`POD_NAME`, falling back to the hostname).
    pub pod_name: String,
    /// Namespace holding the lease (`POD_NAMESPACE`, default `default`).
    pub pod_namespace: String,
    /// Namespace to watch (`WATCH_NAMESPACE`); `None` watches cluster-wide.
    pub watch_namespace: Option<String>,
}

impl OperatorConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), hostname_or_unknown)
    }

    /// Build the configuration from `lookup`.
    ///
    /// Empty values count as unset. `fallback_identity` is only called when
    /// `POD_NAME` is missing.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        fallback_identity: impl FnOnce() -> String,
    ) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            pod_name: get("POD_NAME").unwrap_or_else(fallback_identity),
            pod_namespace: get("POD_NAMESPACE").unwrap_or_else(|| "default".to_string()),
            watch_namespace: get("WATCH_NAMESPACE"),
        }
    }

    /// Human-readable watch scope for logs.
    pub fn scope(&self) -> &str {
        self.watch_namespace.as_deref().unwrap_or("cluster-wide")
    }
}

fn hostname_or_unknown() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
