//! memcached-operator library crate
//!
//! This module exports the controller, CRD definitions, and resource generators.

pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;

pub use health::HealthState;

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::ListParams;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{Controller, WatchStreamExt, metadata_watcher, predicates, reflector, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use controller::{
    context::Context,
    reconciler::{error_policy, reconcile},
};
use crd::{Memcached, RESTART_TRIGGER_ANNOTATION, ServiceMonitor};

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Create the default watcher configuration for all controllers.
///
/// This ensures consistent behavior across all controllers:
/// - `any_semantic()`: More reliable resource discovery in test environments
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Create a filtered stream for a resource type with standard optimizations.
///
/// This creates a reflector-backed stream that:
/// - Maintains an in-memory cache via reflector
/// - Uses automatic retry with exponential backoff on errors
/// - Converts watch events to objects (Added/Modified only)
/// - Drops events for which `predicate` returns an unchanged value
///
/// Returns the reflector store (for cache lookups) and the filtered stream.
fn create_filtered_stream<K, P>(
    api: Api<K>,
    watcher_config: WatcherConfig,
    predicate: P,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
    P: Fn(&K) -> Option<u64> + Send + 'static,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicate);
    (reader, stream)
}

/// Predicate value for Memcached watch events.
///
/// Combines `metadata.generation` with the restart-trigger annotation, which
/// changes without bumping the generation. Status-only updates keep the
/// same value and are filtered out.
pub fn memcached_change_key(memcached: &Memcached) -> Option<u64> {
    let generation = predicates::generation(memcached)?;
    let mut hasher = DefaultHasher::new();
    generation.hash(&mut hasher);
    memcached
        .annotations()
        .get(RESTART_TRIGGER_ANNOTATION)
        .hash(&mut hasher);
    Some(hasher.finish())
}

/// Memcacheds in `namespace` that reference the Secret `secret_name`.
///
/// Used to map Secret watch events back to the resources that mount them.
pub fn memcacheds_referencing_secret(
    memcacheds: &[Arc<Memcached>],
    namespace: Option<&str>,
    secret_name: &str,
) -> Vec<ObjectRef<Memcached>> {
    memcacheds
        .iter()
        .filter(|mc| mc.namespace().as_deref() == namespace)
        .filter(|mc| {
            mc.referenced_secret_names()
                .iter()
                .any(|name| name == secret_name)
        })
        .map(|mc| ObjectRef::from_obj(mc.as_ref()))
        .collect()
}

/// Whether the Prometheus Operator's ServiceMonitor CRD is served.
async fn service_monitor_crd_installed(api: &Api<ServiceMonitor>) -> bool {
    match api.list(&ListParams::default().limit(1)).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "ServiceMonitor is not queryable, not watching ServiceMonitors");
            false
        }
    }
}

/// Run the operator controller with optional namespace scoping.
///
/// When `namespace` is `Some(ns)`, only watches resources in that namespace.
/// When `namespace` is `None`, watches resources cluster-wide.
///
/// If health_state is provided, metrics will be recorded for reconciliations.
pub async fn run_controller_scoped(
    client: Client,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    info!(
        "Starting controller for Memcached resources (scope: {})",
        scope_msg
    );

    // Mark as ready once we start the controller
    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ctx = Arc::new(Context::new(client.clone(), health_state.clone()));

    // Set up APIs for the controller (namespaced or cluster-wide)
    let memcacheds: Api<Memcached> = scoped_api(client.clone(), namespace);
    let deployments: Api<Deployment> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client.clone(), namespace);
    let pdbs: Api<PodDisruptionBudget> = scoped_api(client.clone(), namespace);
    let hpas: Api<HorizontalPodAutoscaler> = scoped_api(client.clone(), namespace);
    let network_policies: Api<NetworkPolicy> = scoped_api(client.clone(), namespace);
    let service_monitors: Api<ServiceMonitor> = scoped_api(client.clone(), namespace);
    let secrets: Api<Secret> = scoped_api(client.clone(), namespace);

    // Use consistent watcher configuration across all controllers
    let watcher_config = default_watcher_config();

    // Create filtered stream with standard optimizations (reflector, backoff, change predicate)
    let (reader, resource_stream) =
        create_filtered_stream(memcacheds, watcher_config.clone(), memcached_change_key);
    let secret_index = reader.clone();

    // Keep a full watcher for Deployments since status is derived from
    // .status.readyReplicas; everything else only needs metadata.
    let controller = Controller::for_stream(resource_stream, reader)
        .owns(deployments, watcher_config.clone())
        .owns_stream(metadata_watcher(services, watcher_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(pdbs, watcher_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(hpas, watcher_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(network_policies, watcher_config.clone()).touched_objects())
        .watches_stream(
            metadata_watcher(secrets, watcher_config.clone()).touched_objects(),
            move |secret| {
                memcacheds_referencing_secret(
                    &secret_index.state(),
                    secret.namespace().as_deref(),
                    &secret.name_any(),
                )
            },
        );

    let controller = if service_monitor_crd_installed(&service_monitors).await {
        controller
            .owns_stream(metadata_watcher(service_monitors, watcher_config).touched_objects())
    } else {
        controller
    };

    controller
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            let health_state = health_state.clone();
            async move {
                match result {
                    Ok((obj, _action)) => {
                        debug!("Reconciled: {}", obj.name);
                    }
                    Err(e) => {
                        // ObjectNotFound/NotFound errors are expected after deletion when
                        // related watch events trigger reconciliation for a deleted object.
                        // Log these at debug level instead of error.
                        let is_not_found = match &e {
                            kube::runtime::controller::Error::ObjectNotFound(obj_ref) => {
                                if let (Some(state), Some(ns)) =
                                    (health_state.as_ref(), obj_ref.namespace.as_deref())
                                {
                                    state.metrics.forget_memcached(ns, &obj_ref.name);
                                }
                                true
                            }
                            kube::runtime::controller::Error::ReconcilerFailed(err, _) => {
                                err.is_not_found()
                            }
                            _ => false,
                        };
                        if is_not_found {
                            debug!("Object no longer exists (likely deleted): {:?}", e);
                        } else {
                            error!("Reconciliation error: {:?}", e);
                        }
                    }
                }
            }
        })
        .await;

    // This should never complete in normal operation
    error!("Controller stream ended unexpectedly");
}
