//! Reconciliation loop for Memcached.
//!
//! Every pass converges all owned objects onto the current spec, then derives
//! and persists status. Passes are level-triggered: nothing depends on what
//! the previous pass did.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{ResourceExt, runtime::controller::Action};
use tracing::{debug, error, info, warn};

use crate::{
    client::{ManagedObject, ObjectStore},
    controller::{
        context::Context,
        error::{Error, Result},
        mutator::{Outcome, create_or_update, delete_if_exists},
        secrets::resolve_secrets,
        status::{ObservedReplicas, build_status},
    },
    crd::{Memcached, MemcachedStatus},
    resources::{
        deployment::{apply_deployment, generate_deployment},
        hpa::{apply_hpa, generate_hpa},
        network_policy::{apply_network_policy, generate_network_policy},
        pdb::{apply_pod_disruption_budget, generate_pod_disruption_budget},
        service::{apply_service, generate_service},
        service_monitor::{apply_service_monitor, generate_service_monitor},
    },
};

/// Kind names used in errors, events and metrics.
pub const MEMCACHED_KIND: &str = "Memcached";
pub const DEPLOYMENT_KIND: &str = "Deployment";
pub const SERVICE_KIND: &str = "Service";
pub const PDB_KIND: &str = "PodDisruptionBudget";
pub const SERVICE_MONITOR_KIND: &str = "ServiceMonitor";
pub const NETWORK_POLICY_KIND: &str = "NetworkPolicy";
pub const HPA_KIND: &str = "HorizontalPodAutoscaler";

/// Event action for everything the reconciler does.
const RECONCILE_ACTION: &str = "Reconcile";

/// What a reconcile pass did.
#[derive(Clone, Debug, Default)]
pub struct ReconcileReport {
    /// Whether a live Memcached was found.
    pub found: bool,
    /// Create-or-update outcome per owned kind, in reconcile order.
    pub outcomes: Vec<(&'static str, Outcome)>,
    /// Kinds deleted because their feature is disabled.
    pub deleted: Vec<&'static str>,
    /// Referenced secrets that do not exist.
    pub missing_secrets: Vec<String>,
    /// Status computed for this pass.
    pub status: Option<MemcachedStatus>,
}

impl ReconcileReport {
    /// Outcome for one kind, if it was reconciled.
    pub fn outcome(&self, kind: &str) -> Option<Outcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| *outcome)
    }

    /// Whether every reconciled object was already up to date.
    pub fn is_unchanged(&self) -> bool {
        self.deleted.is_empty()
            && self
                .outcomes
                .iter()
                .all(|(_, outcome)| *outcome == Outcome::Unchanged)
    }
}

/// Reconcile a Memcached
///
/// Entry point for the controller runtime. Owned objects and watched secrets
/// trigger new passes, so no periodic requeue is needed.
pub async fn reconcile<S>(obj: Arc<Memcached>, ctx: Arc<Context<S>>) -> Result<Action>
where
    S: ObjectStore,
{
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;

    debug!(name = %name, namespace = %namespace, "Reconciling Memcached");

    reconcile_memcached(&ctx, &namespace, &name).await?;

    if let Some(ref health_state) = ctx.health_state {
        let duration = start_time.elapsed().as_secs_f64();
        health_state
            .metrics
            .record_reconcile(&namespace, &name, duration);
        let now = u64::try_from(jiff::Timestamp::now().as_second()).unwrap_or(0);
        health_state.last_reconcile.store(now, Ordering::Relaxed);
    }

    Ok(Action::await_change())
}

/// Error policy for the controller
pub fn error_policy<S>(obj: Arc<Memcached>, error: &Error, ctx: Arc<Context<S>>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    // Record error metric
    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, namespace = %namespace, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, namespace = %namespace, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after())
}

/// Run one reconcile pass for the Memcached `namespace/name`.
///
/// Steps run in a fixed order: secrets, Deployment, Service, then the
/// feature-gated PodDisruptionBudget, ServiceMonitor, NetworkPolicy and
/// HorizontalPodAutoscaler, then status. A failing owned-object step aborts
/// the pass before status is written.
pub async fn reconcile_memcached<S: ObjectStore>(
    ctx: &Context<S>,
    namespace: &str,
    name: &str,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    let resource = match ctx
        .store
        .get::<Memcached>(namespace, name)
        .await
        .map_err(|e| Error::resource(MEMCACHED_KIND, e))?
    {
        Some(resource) if resource.metadata.deletion_timestamp.is_none() => resource,
        Some(_) => {
            debug!(name, namespace, "Memcached is being deleted, skipping");
            forget(ctx, namespace, name);
            return Ok(report);
        }
        None => {
            debug!(name, namespace, "Memcached not found (likely deleted)");
            forget(ctx, namespace, name);
            return Ok(report);
        }
    };
    report.found = true;

    // Secrets
    let secrets = resolve_secrets(&ctx.store, &resource).await?;
    let secret_hash = secrets.hash();
    if !secrets.missing.is_empty() {
        ctx.publish_warning_event(
            &resource,
            "SecretNotFound",
            RECONCILE_ACTION,
            Some(format!(
                "Referenced secrets not found: {}",
                secrets.missing.join(", ")
            )),
        )
        .await;
    }
    report.missing_secrets = secrets.missing.clone();

    // Deployment and Service always exist
    let deployment = generate_deployment(&resource, secret_hash.as_deref());
    let outcome = create_or_update(ctx, &resource, name, DEPLOYMENT_KIND, |obj: &mut Deployment| {
        apply_deployment(obj, deployment.clone());
        Ok(())
    })
    .await?;
    report.outcomes.push((DEPLOYMENT_KIND, outcome));

    let service = generate_service(&resource);
    let outcome = create_or_update(ctx, &resource, name, SERVICE_KIND, |obj: &mut Service| {
        apply_service(obj, service.clone());
        Ok(())
    })
    .await?;
    report.outcomes.push((SERVICE_KIND, outcome));

    // Feature-gated objects
    reconcile_optional(
        ctx,
        &resource,
        PDB_KIND,
        resource
            .pdb_enabled()
            .then(|| generate_pod_disruption_budget(&resource)),
        apply_pod_disruption_budget,
        &mut report,
    )
    .await?;

    reconcile_optional(
        ctx,
        &resource,
        SERVICE_MONITOR_KIND,
        resource
            .service_monitor_enabled()
            .then(|| generate_service_monitor(&resource)),
        apply_service_monitor,
        &mut report,
    )
    .await?;

    reconcile_optional(
        ctx,
        &resource,
        NETWORK_POLICY_KIND,
        resource
            .network_policy_enabled()
            .then(|| generate_network_policy(&resource)),
        apply_network_policy,
        &mut report,
    )
    .await?;

    reconcile_optional(
        ctx,
        &resource,
        HPA_KIND,
        resource
            .autoscaling_enabled()
            .then(|| generate_hpa(&resource)),
        apply_hpa,
        &mut report,
    )
    .await?;

    // Status
    let live: Option<Deployment> = ctx
        .store
        .get(namespace, name)
        .await
        .map_err(|e| Error::resource(DEPLOYMENT_KIND, e))?;
    let observed = live.as_ref().map(ObservedReplicas::from_deployment);
    let now = jiff::Timestamp::now().to_string();
    let status = build_status(&resource, observed, &secrets.missing, &now);

    if status_changed(resource.status.as_ref(), &status)? {
        ctx.store
            .patch_memcached_status(namespace, name, &status)
            .await
            .map_err(|e| Error::resource(MEMCACHED_KIND, e))?;
        info!(
            name,
            namespace,
            ready_replicas = status.ready_replicas,
            "Updated status"
        );
    } else {
        debug!(name, namespace, "Status unchanged");
    }

    if let Some(metrics) = ctx.metrics() {
        let desired = if resource.autoscaling_enabled() {
            observed.map(|o| o.total).unwrap_or(0)
        } else {
            resource.spec_replicas()
        };
        metrics.set_memcached_gauges(
            namespace,
            name,
            i64::from(desired),
            i64::from(status.ready_replicas),
            resource.image(),
        );
    }

    report.status = Some(status);
    Ok(report)
}

/// Create-or-update `desired` when present, otherwise delete the object if it exists.
async fn reconcile_optional<S, K>(
    ctx: &Context<S>,
    resource: &Memcached,
    kind: &'static str,
    desired: Option<K>,
    apply: fn(&mut K, K),
    report: &mut ReconcileReport,
) -> Result<()>
where
    S: ObjectStore,
    K: ManagedObject + Default,
{
    let name = resource.name_any();
    match desired {
        Some(desired) => {
            let outcome = create_or_update(ctx, resource, &name, kind, |obj: &mut K| {
                apply(obj, desired.clone());
                Ok(())
            })
            .await?;
            report.outcomes.push((kind, outcome));
        }
        None => {
            let namespace = resource
                .namespace()
                .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;
            if delete_if_exists::<S, K>(&ctx.store, kind, &namespace, &name).await? {
                report.deleted.push(kind);
            }
        }
    }
    Ok(())
}

fn status_changed(previous: Option<&MemcachedStatus>, next: &MemcachedStatus) -> Result<bool> {
    let Some(previous) = previous else {
        return Ok(true);
    };
    Ok(serde_json::to_value(previous)? != serde_json::to_value(next)?)
}

fn forget<S>(ctx: &Context<S>, namespace: &str, name: &str) {
    if let Some(metrics) = ctx.metrics() {
        metrics.forget_memcached(namespace, name);
    }
}
