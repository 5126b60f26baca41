//! Common resource generation utilities.
//!
//! Provides the label set, owner reference and port constants shared by all
//! resources owned by a Memcached.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::controller::error::{Error, Result};
use crate::crd::Memcached;

/// Value of `app.kubernetes.io/managed-by` on every owned resource.
pub const MANAGED_BY: &str = "memcached-operator";

/// Value of `app.kubernetes.io/name` on every owned resource.
pub const APP_NAME: &str = "memcached";

/// `app.kubernetes.io/name` label key.
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
/// `app.kubernetes.io/instance` label key.
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
/// `app.kubernetes.io/managed-by` label key.
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Memcached client port.
pub const MEMCACHED_PORT: i32 = 11211;
/// TLS listener port (client port + 1).
pub const MEMCACHED_TLS_PORT: i32 = MEMCACHED_PORT + 1;
/// Exporter metrics port.
pub const METRICS_PORT: i32 = 9150;

/// Port names.
pub const MEMCACHED_PORT_NAME: &str = "memcached";
pub const MEMCACHED_TLS_PORT_NAME: &str = "memcached-tls";
pub const METRICS_PORT_NAME: &str = "metrics";

/// Standard labels applied to all managed resources.
///
/// The same three keys double as the selector, which scopes selection to one
/// Memcached instance even when several share a namespace.
pub fn standard_labels(resource: &Memcached) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_NAME.to_string(), APP_NAME.to_string());
    labels.insert(LABEL_INSTANCE.to_string(), resource.name_any());
    labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string());
    labels
}

/// Label selector matching this instance's pods.
pub fn selector(resource: &Memcached) -> LabelSelector {
    LabelSelector {
        match_labels: Some(standard_labels(resource)),
        ..Default::default()
    }
}

/// Selector scoped to the instance label only, used by anti-affinity terms.
pub fn instance_selector(resource: &Memcached) -> LabelSelector {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_INSTANCE.to_string(), resource.name_any());
    LabelSelector {
        match_labels: Some(labels),
        ..Default::default()
    }
}

/// Create the controller owner reference for a Memcached.
///
/// Fails when the resource has no UID yet, which only happens for objects
/// that were never persisted.
pub fn owner_reference(resource: &Memcached) -> Result<OwnerReference> {
    let uid = resource
        .uid()
        .ok_or_else(|| Error::MissingField("metadata.uid".to_string()))?;

    Ok(OwnerReference {
        api_version: Memcached::api_version(&()).to_string(),
        kind: Memcached::kind(&()).to_string(),
        name: resource.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Merge `extra` onto `base` without letting `extra` override existing keys.
pub fn merge_labels(
    base: &BTreeMap<String, String>,
    extra: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = extra.clone();
    merged.extend(base.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
