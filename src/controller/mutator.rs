//! Idempotent create-or-update and delete of owned objects.
//!
//! Every write is guarded by the `resourceVersion` read in the same attempt. A
//! write that loses an optimistic-concurrency race is retried from a fresh
//! read, a bounded number of times.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use crate::client::{ManagedObject, ObjectStore};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result, is_conflict, is_not_found};
use crate::crd::Memcached;
use crate::resources::common::owner_reference;

/// Attempts made before giving up on a conflicting write.
pub const MAX_CONFLICT_ATTEMPTS: u32 = 5;

/// Result of a create-or-update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
}

impl Outcome {
    /// Metric label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Updated => "updated",
            Outcome::Unchanged => "unchanged",
        }
    }

    /// Event reason, `None` for no-op writes.
    fn event_reason(&self) -> Option<&'static str> {
        match self {
            Outcome::Created => Some("Created"),
            Outcome::Updated => Some("Updated"),
            Outcome::Unchanged => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converge the object `name` in the owner's namespace onto the state written by `mutate`.
///
/// `mutate` receives the live object, or an empty one carrying only name and
/// namespace when none exists. After it runs the owner is stamped as the
/// controller reference; the object is then created, replaced if it differs
/// from what was read, or left alone.
///
/// Every successful outcome bumps the `(kind, outcome)` counter; creates and
/// updates also emit an event. Conflicts restart the attempt; every other
/// error aborts. Failures of `mutate` are wrapped with the kind.
pub async fn create_or_update<S, K, F>(
    ctx: &Context<S>,
    owner: &Memcached,
    name: &str,
    kind: &'static str,
    mut mutate: F,
) -> Result<Outcome>
where
    S: ObjectStore,
    K: ManagedObject + Default,
    F: FnMut(&mut K) -> Result<()> + Send,
{
    let namespace = owner
        .namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;
    let owner_ref = owner_reference(owner)?;

    for attempt in 1..=MAX_CONFLICT_ATTEMPTS {
        let live: Option<K> = ctx
            .store
            .get(&namespace, name)
            .await
            .map_err(|e| Error::resource(kind, e))?;

        let mut desired = live.clone().unwrap_or_else(|| {
            let mut obj = K::default();
            obj.meta_mut().name = Some(name.to_string());
            obj.meta_mut().namespace = Some(namespace.clone());
            obj
        });
        mutate(&mut desired).map_err(|e| Error::mutation(kind, e))?;
        set_controller_reference(&mut desired, owner_ref.clone(), kind)?;

        let written = match &live {
            None => ctx.store.create(&namespace, &desired).await.map(|_| Outcome::Created),
            Some(live) => {
                let live_value =
                    serde_json::to_value(live).map_err(|e| Error::mutation(kind, e))?;
                let desired_value =
                    serde_json::to_value(&desired).map_err(|e| Error::mutation(kind, e))?;
                if live_value == desired_value {
                    debug!(kind, name, namespace = %namespace, "Unchanged");
                    if let Some(metrics) = ctx.metrics() {
                        metrics.record_resource_operation(kind, Outcome::Unchanged.as_str());
                    }
                    return Ok(Outcome::Unchanged);
                }
                ctx.store
                    .replace(&namespace, name, &desired)
                    .await
                    .map(|_| Outcome::Updated)
            }
        };

        match written {
            Ok(outcome) => {
                info!(kind, name, namespace = %namespace, outcome = %outcome, "Reconciled owned resource");
                if let Some(metrics) = ctx.metrics() {
                    metrics.record_resource_operation(kind, outcome.as_str());
                }
                if let Some(reason) = outcome.event_reason() {
                    ctx.publish_normal_event(
                        owner,
                        reason,
                        "Reconcile",
                        Some(format!("{} {} {}", reason, kind, name)),
                    )
                    .await;
                }
                return Ok(outcome);
            }
            Err(e) if is_conflict(&e) => {
                debug!(kind, name, attempt, "Write conflict, retrying");
            }
            Err(e) => return Err(Error::resource(kind, e)),
        }
    }

    Err(Error::ConflictRetriesExhausted {
        kind,
        name: name.to_string(),
        attempts: MAX_CONFLICT_ATTEMPTS,
    })
}

/// Delete an object if it exists.
///
/// Returns whether a delete was issued. Not-found at either step is success.
pub async fn delete_if_exists<S, K>(
    store: &S,
    kind: &'static str,
    namespace: &str,
    name: &str,
) -> Result<bool>
where
    S: ObjectStore,
    K: ManagedObject,
{
    match store.get::<K>(namespace, name).await {
        Ok(Some(_)) => {}
        Ok(None) => return Ok(false),
        Err(e) if is_not_found(&e) => return Ok(false),
        Err(e) => return Err(Error::resource(kind, e)),
    }

    match store.delete::<K>(namespace, name).await {
        Ok(()) => {
            info!(kind, name, namespace, "Deleted owned resource");
            Ok(true)
        }
        Err(e) if is_not_found(&e) => Ok(false),
        Err(e) => Err(Error::resource(kind, e)),
    }
}

/// Make `owner` the controller of `obj`.
///
/// An existing reference to the same owner is refreshed in place. Fails when
/// a different controller already owns the object.
pub fn set_controller_reference<K: Resource>(
    obj: &mut K,
    owner: OwnerReference,
    kind: &'static str,
) -> Result<()> {
    let name = obj.meta().name.clone().unwrap_or_default();
    let refs = obj.meta_mut().owner_references.get_or_insert_with(Vec::new);

    if let Some(other) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(Error::OwnerConflict {
            kind,
            name,
            owner: format!("{}/{}", other.kind, other.name),
        });
    }

    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) => *existing = owner,
        None => refs.push(owner),
    }
    Ok(())
}
