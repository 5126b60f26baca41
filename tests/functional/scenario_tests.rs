//! Multi-step reconcile scenarios against the in-memory store.
//!
//! Each test drives `reconcile_memcached` the way the controller would:
//! repeated passes over a resource whose owned objects are also touched by
//! other writers.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use kube::runtime::controller::Action;

use crate::common::fixtures::{MemcachedBuilder, secret};
use crate::mock_store::{Gauges, Harness, MockStore, RecordingEvents};
use memcached_operator::controller::context::Context;
use memcached_operator::controller::error::Error;
use memcached_operator::controller::mutator::{MAX_CONFLICT_ATTEMPTS, Outcome};
use memcached_operator::controller::reconciler::{
    DEPLOYMENT_KIND, HPA_KIND, NETWORK_POLICY_KIND, PDB_KIND, SERVICE_KIND, SERVICE_MONITOR_KIND,
    error_policy,
};
use memcached_operator::controller::status::{REASON_SECRET_NOT_FOUND, find_condition};
use memcached_operator::crd::{
    ConditionType, Memcached, MemcachedStatus, SECRET_HASH_ANNOTATION, ServiceMonitor,
};

const NS: &str = "default";

fn deployment(harness: &Harness, name: &str) -> Deployment {
    harness.store().object(NS, name).unwrap()
}

fn replicas(harness: &Harness, name: &str) -> Option<i32> {
    deployment(harness, name).spec.unwrap().replicas
}

fn secret_hash(harness: &Harness, name: &str) -> Option<String> {
    deployment(harness, name)
        .spec
        .unwrap()
        .template
        .metadata
        .and_then(|m| m.annotations)
        .and_then(|a| a.get(SECRET_HASH_ANNOTATION).cloned())
}

fn stored_status(harness: &Harness, name: &str) -> MemcachedStatus {
    harness
        .store()
        .object::<Memcached>(NS, name)
        .unwrap()
        .status
        .unwrap()
}

fn flags(status: &MemcachedStatus) -> (bool, bool, bool) {
    let flag = |t| find_condition(&status.conditions, t).unwrap().is_true();
    (
        flag(ConditionType::Available),
        flag(ConditionType::Progressing),
        flag(ConditionType::Degraded),
    )
}

// ============================================================================
// Creation and idempotence
// ============================================================================

#[tokio::test]
async fn test_first_pass_creates_deployment_and_service() {
    let harness = Harness::with(MemcachedBuilder::new("cache").replicas(3).build());

    let report = harness.reconcile_ok(NS, "cache").await;

    assert!(report.found);
    assert_eq!(report.outcome(DEPLOYMENT_KIND), Some(Outcome::Created));
    assert_eq!(report.outcome(SERVICE_KIND), Some(Outcome::Created));
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.deleted.is_empty());

    assert_eq!(replicas(&harness, "cache"), Some(3));
    let service: Service = harness.store().object(NS, "cache").unwrap();
    assert_eq!(
        service.spec.unwrap().cluster_ip,
        Some("None".to_string())
    );
    assert_eq!(harness.store().count::<PodDisruptionBudget>(NS), 0);
    assert_eq!(
        harness.events.reasons(),
        vec!["Created".to_string(), "Created".to_string()]
    );
}

#[tokio::test]
async fn test_second_pass_is_a_no_op() {
    let harness = Harness::with(
        MemcachedBuilder::new("cache")
            .replicas(2)
            .monitoring(true)
            .pdb(1)
            .network_policy()
            .build(),
    );

    harness.reconcile_ok(NS, "cache").await;
    harness.store().clear_writes();
    harness.events.clear();

    let report = harness.reconcile_ok(NS, "cache").await;

    assert!(report.is_unchanged());
    assert!(harness.store().writes().is_empty());
    assert!(harness.events.reasons().is_empty());
}

#[tokio::test]
async fn test_missing_resource_is_success() {
    let harness = Harness::new();

    let report = harness.reconcile_ok(NS, "gone").await;

    assert!(!report.found);
    assert!(report.outcomes.is_empty());
    assert!(harness.store().writes().is_empty());
}

#[tokio::test]
async fn test_resource_being_deleted_is_skipped() {
    let mut resource = MemcachedBuilder::new("cache").build();
    resource.metadata.deletion_timestamp =
        Some(serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).unwrap());
    let harness = Harness::with(resource);

    let report = harness.reconcile_ok(NS, "cache").await;

    assert!(!report.found);
    assert!(harness.store().writes().is_empty());
}

// ============================================================================
// Drift
// ============================================================================

#[tokio::test]
async fn test_drift_is_reverted() {
    let harness = Harness::with(MemcachedBuilder::new("cache").replicas(3).build());
    harness.reconcile_ok(NS, "cache").await;

    harness
        .store()
        .modify::<Deployment>(NS, "cache", |deployment| {
            let spec = deployment.spec.as_mut().unwrap();
            spec.replicas = Some(7);
            let pod = spec.template.spec.as_mut().unwrap();
            pod.containers[0].image = Some("memcached:evil".to_string());
        });
    harness.store().modify::<Service>(NS, "cache", |service| {
        service.metadata.labels = None;
    });

    let report = harness.reconcile_ok(NS, "cache").await;

    assert_eq!(report.outcome(DEPLOYMENT_KIND), Some(Outcome::Updated));
    assert_eq!(report.outcome(SERVICE_KIND), Some(Outcome::Updated));
    let deployment = deployment(&harness, "cache");
    let spec = deployment.spec.unwrap();
    assert_eq!(spec.replicas, Some(3));
    assert_eq!(
        spec.template.spec.unwrap().containers[0].image,
        Some("memcached:1.6".to_string())
    );

    let report = harness.reconcile_ok(NS, "cache").await;
    assert!(report.is_unchanged());
}

#[tokio::test]
async fn test_deleted_owned_objects_are_recreated() {
    let harness = Harness::with(MemcachedBuilder::new("cache").replicas(2).build());
    harness.reconcile_ok(NS, "cache").await;

    harness.store().remove::<Deployment>(NS, "cache");
    harness.store().remove::<Service>(NS, "cache");

    let report = harness.reconcile_ok(NS, "cache").await;

    assert_eq!(report.outcome(DEPLOYMENT_KIND), Some(Outcome::Created));
    assert_eq!(report.outcome(SERVICE_KIND), Some(Outcome::Created));
    assert_eq!(replicas(&harness, "cache"), Some(2));
    let service: Service = harness.store().object(NS, "cache").unwrap();
    for refs in [
        deployment(&harness, "cache").owner_references().to_vec(),
        service.owner_references().to_vec(),
    ] {
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].uid, "test-uid-cache");
        assert_eq!(refs[0].controller, Some(true));
    }

    let report = harness.reconcile_ok(NS, "cache").await;
    assert!(report.is_unchanged());
}

#[tokio::test]
async fn test_removed_min_replicas_converges() {
    let harness = Harness::with(MemcachedBuilder::new("cache").autoscaling(3, 8).build());
    harness.reconcile_ok(NS, "cache").await;
    let min = |harness: &Harness| {
        harness
            .store()
            .object::<HorizontalPodAutoscaler>(NS, "cache")
            .unwrap()
            .spec
            .unwrap()
            .min_replicas
    };
    assert_eq!(min(&harness), Some(3));

    harness.store().modify::<Memcached>(NS, "cache", |mc| {
        mc.spec.autoscaling.as_mut().unwrap().min_replicas = None;
    });
    let report = harness.reconcile_ok(NS, "cache").await;

    assert_eq!(report.outcome(HPA_KIND), Some(Outcome::Updated));
    assert_eq!(min(&harness), Some(1));

    let report = harness.reconcile_ok(NS, "cache").await;
    assert!(report.is_unchanged());
}

#[tokio::test]
async fn test_fields_owned_by_others_survive() {
    let harness = Harness::with(MemcachedBuilder::new("cache").build());
    harness.reconcile_ok(NS, "cache").await;

    harness
        .store()
        .modify::<Deployment>(NS, "cache", |deployment| {
            deployment
                .annotations_mut()
                .insert("deployment.kubernetes.io/revision".to_string(), "1".to_string());
            deployment.spec.as_mut().unwrap().revision_history_limit = Some(10);
        });

    let report = harness.reconcile_ok(NS, "cache").await;

    assert_eq!(report.outcome(DEPLOYMENT_KIND), Some(Outcome::Unchanged));
    let deployment = deployment(&harness, "cache");
    assert_eq!(
        deployment
            .annotations()
            .get("deployment.kubernetes.io/revision"),
        Some(&"1".to_string())
    );
}

#[tokio::test]
async fn test_spec_change_rolls_through() {
    let harness = Harness::with(MemcachedBuilder::new("cache").replicas(1).build());
    harness.reconcile_ok(NS, "cache").await;

    harness.store().modify::<Memcached>(NS, "cache", |mc| {
        mc.spec.replicas = Some(4);
        mc.spec.image = Some("memcached:1.6.30".to_string());
        mc.metadata.generation = Some(2);
    });
    let report = harness.reconcile_ok(NS, "cache").await;

    assert_eq!(report.outcome(DEPLOYMENT_KIND), Some(Outcome::Updated));
    assert_eq!(report.outcome(SERVICE_KIND), Some(Outcome::Unchanged));
    assert_eq!(replicas(&harness, "cache"), Some(4));
    assert_eq!(stored_status(&harness, "cache").observed_generation, Some(2));
}

#[tokio::test]
async fn test_autoscaled_replicas_are_left_alone() {
    let harness = Harness::with(MemcachedBuilder::new("cache").autoscaling(2, 8).build());
    harness.reconcile_ok(NS, "cache").await;
    assert_eq!(report_kinds(&harness).await, vec![DEPLOYMENT_KIND, SERVICE_KIND, HPA_KIND]);

    harness
        .store()
        .modify::<Deployment>(NS, "cache", |deployment| {
            deployment.spec.as_mut().unwrap().replicas = Some(6);
        });
    harness.store().set_deployment_status(NS, "cache", 6, 6, 6);

    let report = harness.reconcile_ok(NS, "cache").await;

    assert!(report.is_unchanged());
    assert_eq!(replicas(&harness, "cache"), Some(6));
    let status = stored_status(&harness, "cache");
    assert_eq!(flags(&status), (true, false, false));
    let available = find_condition(&status.conditions, ConditionType::Available).unwrap();
    assert!(available.message.contains("HPA-managed"));
    assert_eq!(
        harness.metrics.gauges(NS, "cache"),
        Some(Gauges {
            desired: 6,
            ready: 6,
            image: "memcached:1.6".to_string(),
        })
    );
}

async fn report_kinds(harness: &Harness) -> Vec<&'static str> {
    harness
        .reconcile_ok(NS, "cache")
        .await
        .outcomes
        .into_iter()
        .map(|(kind, _)| kind)
        .collect()
}

// ============================================================================
// Conflicts and failures
// ============================================================================

#[tokio::test]
async fn test_single_conflict_is_absorbed() {
    let harness = Harness::with(MemcachedBuilder::new("cache").replicas(1).build());
    harness.reconcile_ok(NS, "cache").await;

    harness.store().modify::<Memcached>(NS, "cache", |mc| {
        mc.spec.replicas = Some(2);
    });
    harness.store().inject_conflicts("Deployment", 1);

    let report = harness.reconcile_ok(NS, "cache").await;

    assert_eq!(report.outcome(DEPLOYMENT_KIND), Some(Outcome::Updated));
    assert_eq!(replicas(&harness, "cache"), Some(2));
    assert_eq!(harness.store().pending_conflicts("Deployment"), 0);
}

#[tokio::test]
async fn test_persistent_conflicts_fail_the_pass() {
    let harness = Harness::with(MemcachedBuilder::new("cache").replicas(1).build());
    harness.reconcile_ok(NS, "cache").await;
    let status_before = stored_status(&harness, "cache");

    harness.store().modify::<Memcached>(NS, "cache", |mc| {
        mc.spec.replicas = Some(2);
        mc.metadata.generation = Some(2);
    });
    harness
        .store()
        .inject_conflicts("Deployment", MAX_CONFLICT_ATTEMPTS);

    let err = harness.reconcile(NS, "cache").await.unwrap_err();

    assert!(matches!(
        err,
        Error::ConflictRetriesExhausted {
            kind: DEPLOYMENT_KIND,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(replicas(&harness, "cache"), Some(1));
    // Status is only written at the end of a successful pass
    assert_eq!(
        stored_status(&harness, "cache").observed_generation,
        status_before.observed_generation
    );
}

#[tokio::test]
async fn test_api_failure_aborts_before_status() {
    let harness = Harness::with(MemcachedBuilder::new("cache").build());
    harness.store().fail_writes("Service", 500);

    let err = harness.reconcile(NS, "cache").await.unwrap_err();

    assert!(matches!(err, Error::Resource { kind: SERVICE_KIND, .. }));
    // The Deployment step already ran and is not rolled back
    assert_eq!(harness.store().count::<Deployment>(NS), 1);
    assert!(
        harness
            .store()
            .object::<Memcached>(NS, "cache")
            .unwrap()
            .status
            .is_none()
    );
}

#[test]
fn test_error_policy_requeues_by_error_class() {
    let ctx = Arc::new(Context::from_parts(
        MockStore::new(),
        Arc::new(RecordingEvents::default()),
        None,
    ));
    let resource = Arc::new(MemcachedBuilder::new("cache").build());

    let retryable = Error::ConflictRetriesExhausted {
        kind: DEPLOYMENT_KIND,
        name: "cache".to_string(),
        attempts: MAX_CONFLICT_ATTEMPTS,
    };
    let permanent = Error::OwnerConflict {
        kind: SERVICE_KIND,
        name: "cache".to_string(),
        owner: "StatefulSet/other".to_string(),
    };

    for err in [retryable, permanent] {
        assert_eq!(
            error_policy(resource.clone(), &err, ctx.clone()),
            Action::requeue(err.requeue_after())
        );
    }
    assert_eq!(
        error_policy(resource, &Error::MissingField("x".to_string()), ctx),
        Action::requeue(Duration::from_secs(3600))
    );
}

#[tokio::test]
async fn test_object_owned_by_another_controller_is_not_adopted() {
    let harness = Harness::with(MemcachedBuilder::new("cache").build());
    let mut foreign = Service::default();
    foreign.metadata.name = Some("cache".to_string());
    foreign.metadata.namespace = Some(NS.to_string());
    foreign.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: "StatefulSet".to_string(),
        name: "other".to_string(),
        uid: "other-uid".to_string(),
        controller: Some(true),
        block_owner_deletion: None,
    }]);
    harness.store().insert(foreign);

    let err = harness.reconcile(NS, "cache").await.unwrap_err();

    assert!(matches!(err, Error::OwnerConflict { .. }));
    assert!(!err.is_retryable());
}

// ============================================================================
// Secrets
// ============================================================================

#[tokio::test]
async fn test_secret_rotation_rolls_pods() {
    let harness = Harness::with(MemcachedBuilder::new("cache").sasl("cache-sasl").build());
    harness
        .store()
        .insert(secret(NS, "cache-sasl", &[("password-file", "user:old")]));

    harness.reconcile_ok(NS, "cache").await;
    let before = secret_hash(&harness, "cache").unwrap();

    harness.store().modify::<Secret>(NS, "cache-sasl", |s| {
        *s = secret(NS, "cache-sasl", &[("password-file", "user:new")]);
    });
    let report = harness.reconcile_ok(NS, "cache").await;

    assert_eq!(report.outcome(DEPLOYMENT_KIND), Some(Outcome::Updated));
    let after = secret_hash(&harness, "cache").unwrap();
    assert_ne!(before, after);

    let report = harness.reconcile_ok(NS, "cache").await;
    assert!(report.is_unchanged());
    assert_eq!(secret_hash(&harness, "cache").unwrap(), after);
}

#[tokio::test]
async fn test_shared_secret_gives_identical_fingerprints() {
    let harness = Harness::new();
    harness
        .store()
        .insert(MemcachedBuilder::new("alpha").sasl("shared").build());
    harness
        .store()
        .insert(MemcachedBuilder::new("beta").sasl("shared").build());
    harness
        .store()
        .insert(secret(NS, "shared", &[("password-file", "user:old")]));

    harness.reconcile_ok(NS, "alpha").await;
    harness.reconcile_ok(NS, "beta").await;
    let before = secret_hash(&harness, "alpha").unwrap();
    assert_eq!(secret_hash(&harness, "beta"), Some(before.clone()));

    harness.store().modify::<Secret>(NS, "shared", |s| {
        *s = secret(NS, "shared", &[("password-file", "user:new")]);
    });
    harness.reconcile_ok(NS, "alpha").await;
    harness.reconcile_ok(NS, "beta").await;

    let after = secret_hash(&harness, "alpha").unwrap();
    assert_ne!(after, before);
    assert_eq!(secret_hash(&harness, "beta"), Some(after));
}

#[tokio::test]
async fn test_no_secret_references_means_no_hash() {
    let harness = Harness::with(MemcachedBuilder::new("cache").build());
    harness.reconcile_ok(NS, "cache").await;
    assert_eq!(secret_hash(&harness, "cache"), None);
}

#[tokio::test]
async fn test_missing_secret_degrades() {
    let harness = Harness::with(MemcachedBuilder::new("cache").sasl("cache-sasl").build());

    let report = harness.reconcile_ok(NS, "cache").await;

    assert_eq!(report.missing_secrets, vec!["cache-sasl".to_string()]);
    assert_eq!(harness.store().count::<Deployment>(NS), 1);

    let status = stored_status(&harness, "cache");
    let degraded = find_condition(&status.conditions, ConditionType::Degraded).unwrap();
    assert!(degraded.is_true());
    assert_eq!(degraded.reason, REASON_SECRET_NOT_FOUND);
    assert!(degraded.message.contains("cache-sasl"));

    let warnings = harness.events.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].reason, "SecretNotFound");
}

#[tokio::test]
async fn test_two_missing_secrets_are_both_named() {
    let harness = Harness::with(
        MemcachedBuilder::new("cache")
            .sasl("cache-sasl")
            .tls("cache-tls")
            .build(),
    );

    harness.reconcile_ok(NS, "cache").await;

    let status = stored_status(&harness, "cache");
    let degraded = find_condition(&status.conditions, ConditionType::Degraded).unwrap();
    assert!(degraded.message.contains("cache-sasl"));
    assert!(degraded.message.contains("cache-tls"));
}

#[tokio::test]
async fn test_secret_appearing_later_clears_degraded() {
    let harness = Harness::with(
        MemcachedBuilder::new("cache")
            .replicas(1)
            .sasl("cache-sasl")
            .build(),
    );
    harness.reconcile_ok(NS, "cache").await;
    let missing_hash = secret_hash(&harness, "cache").unwrap();

    harness
        .store()
        .insert(secret(NS, "cache-sasl", &[("password-file", "user:pw")]));
    harness.store().set_deployment_status(NS, "cache", 1, 1, 1);
    let report = harness.reconcile_ok(NS, "cache").await;

    assert!(report.missing_secrets.is_empty());
    assert_eq!(report.outcome(DEPLOYMENT_KIND), Some(Outcome::Updated));
    assert_ne!(secret_hash(&harness, "cache").unwrap(), missing_hash);
    let status = stored_status(&harness, "cache");
    assert_eq!(flags(&status), (true, false, false));
}

// ============================================================================
// Optional features
// ============================================================================

#[tokio::test]
async fn test_all_optional_objects_are_created() {
    let harness = Harness::with(
        MemcachedBuilder::new("cache")
            .monitoring(true)
            .pdb(1)
            .network_policy()
            .autoscaling(1, 3)
            .build(),
    );

    let report = harness.reconcile_ok(NS, "cache").await;

    for kind in [
        DEPLOYMENT_KIND,
        SERVICE_KIND,
        PDB_KIND,
        SERVICE_MONITOR_KIND,
        NETWORK_POLICY_KIND,
        HPA_KIND,
    ] {
        assert_eq!(report.outcome(kind), Some(Outcome::Created), "{kind}");
    }
    assert_eq!(harness.store().count::<ServiceMonitor>(NS), 1);
    assert_eq!(harness.store().count::<NetworkPolicy>(NS), 1);
    assert_eq!(harness.store().count::<HorizontalPodAutoscaler>(NS), 1);
    // Replicas are left for the HPA
    assert_eq!(replicas(&harness, "cache"), None);
}

#[tokio::test]
async fn test_feature_toggle_creates_and_deletes() {
    let harness = Harness::with(MemcachedBuilder::new("cache").pdb(1).build());

    let report = harness.reconcile_ok(NS, "cache").await;
    assert_eq!(report.outcome(PDB_KIND), Some(Outcome::Created));
    assert_eq!(harness.store().count::<PodDisruptionBudget>(NS), 1);

    harness.store().modify::<Memcached>(NS, "cache", |mc| {
        mc.spec.high_availability = None;
    });
    let report = harness.reconcile_ok(NS, "cache").await;
    assert_eq!(report.deleted, vec![PDB_KIND]);
    assert_eq!(report.outcome(PDB_KIND), None);
    assert_eq!(harness.store().count::<PodDisruptionBudget>(NS), 0);

    // Deleting something already gone is a no-op
    harness.store().clear_writes();
    let report = harness.reconcile_ok(NS, "cache").await;
    assert!(report.deleted.is_empty());
    assert!(harness.store().writes().is_empty());
}

#[tokio::test]
async fn test_monitoring_without_service_monitor() {
    let harness = Harness::with(MemcachedBuilder::new("cache").monitoring(false).build());

    let report = harness.reconcile_ok(NS, "cache").await;

    assert_eq!(report.outcome(SERVICE_MONITOR_KIND), None);
    let service: Service = harness.store().object(NS, "cache").unwrap();
    let ports = service.spec.unwrap().ports.unwrap();
    assert!(ports.iter().any(|p| p.name.as_deref() == Some("metrics")));
    let containers = deployment(&harness, "cache")
        .spec
        .unwrap()
        .template
        .spec
        .unwrap()
        .containers;
    assert_eq!(containers.len(), 2);
}

// ============================================================================
// Isolation
// ============================================================================

#[tokio::test]
async fn test_resources_in_one_namespace_are_isolated() {
    let harness = Harness::new();
    harness
        .store()
        .insert(MemcachedBuilder::new("alpha").replicas(1).build());
    harness
        .store()
        .insert(MemcachedBuilder::new("beta").replicas(3).pdb(2).build());

    harness.reconcile_ok(NS, "alpha").await;
    harness.reconcile_ok(NS, "beta").await;

    assert_eq!(replicas(&harness, "alpha"), Some(1));
    assert_eq!(replicas(&harness, "beta"), Some(3));
    assert_eq!(harness.store().count::<PodDisruptionBudget>(NS), 1);

    let alpha = deployment(&harness, "alpha");
    assert_eq!(alpha.owner_references()[0].uid, "test-uid-alpha");
    let beta = deployment(&harness, "beta");
    assert_eq!(beta.owner_references()[0].uid, "test-uid-beta");

    // Drift on alpha is untouched by a pass over beta
    harness
        .store()
        .modify::<Deployment>(NS, "alpha", |deployment| {
            deployment.spec.as_mut().unwrap().replicas = Some(9);
        });
    let report = harness.reconcile_ok(NS, "beta").await;
    assert!(report.is_unchanged());
    assert_eq!(replicas(&harness, "alpha"), Some(9));

    assert!(!harness.events.for_resource("alpha").is_empty());
    assert_eq!(
        harness.events.for_resource("beta").len(),
        3,
        "Deployment, Service and PodDisruptionBudget"
    );
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn test_status_table() {
    // (desired, ready, updated, total) -> (available, progressing, degraded)
    let cases = [
        ((3, 3, 3, 3), (true, false, false)),
        ((3, 1, 3, 3), (true, false, true)),
        ((0, 0, 0, 0), (true, false, false)),
        ((5, 3, 3, 3), (true, true, true)),
    ];

    for ((desired, ready, updated, total), expected) in cases {
        let harness = Harness::with(MemcachedBuilder::new("cache").replicas(desired).build());
        harness.reconcile_ok(NS, "cache").await;
        harness
            .store()
            .set_deployment_status(NS, "cache", ready, updated, total);

        let report = harness.reconcile_ok(NS, "cache").await;

        let status = report.status.unwrap();
        assert_eq!(flags(&status), expected, "{desired}/{ready}/{updated}/{total}");
        assert_eq!(status.ready_replicas, ready);
        assert_eq!(stored_status(&harness, "cache").ready_replicas, ready);
    }
}

#[tokio::test]
async fn test_unchanged_status_is_not_rewritten() {
    let harness = Harness::with(MemcachedBuilder::new("cache").replicas(2).build());
    harness.reconcile_ok(NS, "cache").await;
    harness.store().set_deployment_status(NS, "cache", 2, 2, 2);
    harness.reconcile_ok(NS, "cache").await;
    let first = stored_status(&harness, "cache");

    harness.store().clear_writes();
    harness.reconcile_ok(NS, "cache").await;

    assert!(harness.store().writes().is_empty());
    assert_eq!(
        serde_json::to_value(stored_status(&harness, "cache")).unwrap(),
        serde_json::to_value(first).unwrap()
    );
}

#[tokio::test]
async fn test_gauges_follow_the_resource() {
    let harness = Harness::with(
        MemcachedBuilder::new("cache")
            .replicas(3)
            .image("memcached:1.6.30")
            .build(),
    );
    harness.reconcile_ok(NS, "cache").await;
    harness.store().set_deployment_status(NS, "cache", 2, 3, 3);
    harness.reconcile_ok(NS, "cache").await;

    assert_eq!(
        harness.metrics.gauges(NS, "cache"),
        Some(Gauges {
            desired: 3,
            ready: 2,
            image: "memcached:1.6.30".to_string(),
        })
    );

    harness.store().remove::<Memcached>(NS, "cache");
    harness.reconcile_ok(NS, "cache").await;
    assert_eq!(harness.metrics.gauges(NS, "cache"), None);
    assert_eq!(harness.metrics.operations(DEPLOYMENT_KIND, "created"), 1);
}
