//! Status management utilities.
//!
//! Derives the Available, Progressing and Degraded conditions from the
//! Deployment's observed replica counts, and merges them into the previous
//! status so transition times only move when a condition flips.

use k8s_openapi::api::apps::v1::Deployment;

use crate::crd::{Condition, ConditionType, Memcached, MemcachedStatus};

/// Condition reasons.
pub const REASON_AVAILABLE: &str = "Available";
pub const REASON_UNAVAILABLE: &str = "Unavailable";
pub const REASON_ROLLOUT_IN_PROGRESS: &str = "RolloutInProgress";
pub const REASON_ROLLOUT_COMPLETE: &str = "RolloutComplete";
pub const REASON_DEGRADED: &str = "Degraded";
pub const REASON_NOT_DEGRADED: &str = "NotDegraded";
pub const REASON_DEPLOYMENT_NOT_FOUND: &str = "DeploymentNotFound";
pub const REASON_SECRET_NOT_FOUND: &str = "SecretNotFound";

/// Replica counts reported by the Deployment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObservedReplicas {
    pub ready: i32,
    pub updated: i32,
    pub total: i32,
}

impl ObservedReplicas {
    /// Read counts from a Deployment's status; absent counts are zero.
    pub fn from_deployment(deployment: &Deployment) -> Self {
        let status = deployment.status.as_ref();
        Self {
            ready: status.and_then(|s| s.ready_replicas).unwrap_or(0),
            updated: status.and_then(|s| s.updated_replicas).unwrap_or(0),
            total: status.and_then(|s| s.replicas).unwrap_or(0),
        }
    }
}

/// Compute the three conditions.
///
/// `desired` is the spec replica count. While the HPA manages replicas the
/// Deployment's current total stands in for it. `observed` is `None` when the
/// Deployment does not exist.
pub fn compute_conditions(
    desired: i32,
    observed: Option<ObservedReplicas>,
    hpa_managed: bool,
    generation: Option<i64>,
    now: &str,
) -> Vec<Condition> {
    let Some(observed) = observed else {
        let message = "Deployment not found";
        return vec![
            Condition::new(
                ConditionType::Available,
                false,
                REASON_DEPLOYMENT_NOT_FOUND,
                message,
                generation,
                now,
            ),
            Condition::new(
                ConditionType::Progressing,
                true,
                REASON_DEPLOYMENT_NOT_FOUND,
                message,
                generation,
                now,
            ),
            Condition::new(
                ConditionType::Degraded,
                true,
                REASON_DEPLOYMENT_NOT_FOUND,
                message,
                generation,
                now,
            ),
        ];
    };

    let desired = if hpa_managed { observed.total } else { desired };
    let ObservedReplicas {
        ready,
        updated,
        total,
    } = observed;

    let available = ready > 0 || desired == 0;
    let progressing = updated != total || total != desired;
    let degraded = ready != desired && !(desired == 0 && ready == 0);

    let suffix = if hpa_managed { " (HPA-managed)" } else { "" };
    let available_message = format!("{}/{} replicas ready{}", ready, desired, suffix);
    let progressing_message = if progressing {
        format!(
            "Rollout in progress: {} updated, {} total, {} desired",
            updated, total, desired
        )
    } else {
        format!("All {} replicas updated", desired)
    };
    let degraded_message = if degraded {
        format!("{}/{} replicas ready", ready, desired)
    } else {
        "All desired replicas ready".to_string()
    };

    vec![
        Condition::new(
            ConditionType::Available,
            available,
            if available {
                REASON_AVAILABLE
            } else {
                REASON_UNAVAILABLE
            },
            &available_message,
            generation,
            now,
        ),
        Condition::new(
            ConditionType::Progressing,
            progressing,
            if progressing {
                REASON_ROLLOUT_IN_PROGRESS
            } else {
                REASON_ROLLOUT_COMPLETE
            },
            &progressing_message,
            generation,
            now,
        ),
        Condition::new(
            ConditionType::Degraded,
            degraded,
            if degraded {
                REASON_DEGRADED
            } else {
                REASON_NOT_DEGRADED
            },
            &degraded_message,
            generation,
            now,
        ),
    ]
}

/// Force Degraded when referenced secrets are missing.
///
/// The message lists every missing name. No-op when `missing` is empty.
pub fn apply_missing_secrets(
    conditions: &mut Vec<Condition>,
    missing: &[String],
    generation: Option<i64>,
    now: &str,
) {
    if missing.is_empty() {
        return;
    }
    let message = format!("Referenced secrets not found: {}", missing.join(", "));
    set_condition(
        conditions,
        Condition::new(
            ConditionType::Degraded,
            true,
            REASON_SECRET_NOT_FOUND,
            &message,
            generation,
            now,
        ),
    );
}

/// Add or replace the condition of the same type.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.r#type == condition.r#type)
    {
        *existing = condition;
    } else {
        conditions.push(condition);
    }
}

/// Carry `lastTransitionTime` over from `previous` for conditions whose status did not change.
pub fn merge_conditions(previous: &[Condition], mut next: Vec<Condition>) -> Vec<Condition> {
    for condition in &mut next {
        if let Some(old) = previous
            .iter()
            .find(|c| c.r#type == condition.r#type && c.status == condition.status)
        {
            condition.last_transition_time = old.last_transition_time.clone();
        }
    }
    next
}

/// Build the status to persist for a Memcached.
pub fn build_status(
    resource: &Memcached,
    observed: Option<ObservedReplicas>,
    missing_secrets: &[String],
    now: &str,
) -> MemcachedStatus {
    let generation = resource.metadata.generation;
    let mut conditions = compute_conditions(
        resource.spec_replicas(),
        observed,
        resource.autoscaling_enabled(),
        generation,
        now,
    );
    apply_missing_secrets(&mut conditions, missing_secrets, generation, now);

    let previous = resource
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();

    MemcachedStatus {
        observed_generation: generation,
        ready_replicas: observed.map(|o| o.ready).unwrap_or(0),
        conditions: merge_conditions(previous, conditions),
    }
}

/// Find a condition by type
pub fn find_condition(conditions: &[Condition], condition_type: ConditionType) -> Option<&Condition> {
    let name = condition_type.to_string();
    conditions.iter().find(|c| c.r#type == name)
}

/// Check if a condition type is true
pub fn is_condition_true(conditions: &[Condition], condition_type: ConditionType) -> bool {
    find_condition(conditions, condition_type).is_some_and(Condition::is_true)
}
