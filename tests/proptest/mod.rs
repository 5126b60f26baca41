// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for memcached-operator.
//!
//! Uses proptest to generate random inputs and verify invariants.

use proptest::prelude::*;

use memcached_operator::controller::secrets::compute_secret_hash;
use memcached_operator::controller::status::{ObservedReplicas, compute_conditions, is_condition_true};
use memcached_operator::crd::{ConditionType, MemcachedConfig};
use memcached_operator::resources::deployment::{build_memcached_args, generate_deployment};

#[path = "../common/mod.rs"]
mod common;

use common::fixtures::{MemcachedBuilder, secret};

/// Strategy for generating engine settings.
fn any_engine() -> impl Strategy<Value = MemcachedConfig> {
    (
        16..=65536i32,
        1..=65536i32,
        1..=64i32,
        prop::sample::select(vec!["512k", "1m", "2m", "128m"]),
        0..=3i32,
        prop::collection::vec("-[a-zA-Z]( [a-z0-9]{1,4})?", 0..4),
    )
        .prop_map(
            |(max_memory_mb, max_connections, threads, item_size, verbosity, extra_args)| {
                MemcachedConfig {
                    max_memory_mb,
                    max_connections,
                    threads,
                    max_item_size: item_size.to_string(),
                    verbosity,
                    extra_args,
                }
            },
        )
}

/// Strategy for generating observed replica counts with `ready <= total`.
fn any_observed() -> impl Strategy<Value = ObservedReplicas> {
    (0..=20i32).prop_flat_map(|total| {
        (0..=total, 0..=total).prop_map(move |(ready, updated)| ObservedReplicas {
            ready,
            updated,
            total,
        })
    })
}

/// Strategy for generating secret data entries.
fn any_entries() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-z.-]{1,12}", "[ -~]{0,32}"), 0..5)
}

proptest! {
    /// Generating twice from the same resource yields identical objects.
    #[test]
    fn test_deployment_is_deterministic(
        replicas in 0..=50i32,
        engine in any_engine(),
        sasl in any::<bool>(),
        monitoring in any::<bool>(),
    ) {
        let mut builder = MemcachedBuilder::new("cache").replicas(replicas).engine(engine);
        if sasl {
            builder = builder.sasl("cache-sasl");
        }
        if monitoring {
            builder = builder.monitoring(false);
        }
        let resource = builder.build();

        let first = serde_json::to_value(generate_deployment(&resource, Some("abc"))).unwrap();
        let second = serde_json::to_value(generate_deployment(&resource, Some("abc"))).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Engine flags come first in fixed order and extra args come last.
    #[test]
    fn test_args_order(engine in any_engine(), sasl in any::<bool>(), tls in any::<bool>()) {
        let mut builder = MemcachedBuilder::new("cache").engine(engine.clone());
        if sasl {
            builder = builder.sasl("cache-sasl");
        }
        if tls {
            builder = builder.tls("cache-tls");
        }
        let args = build_memcached_args(&builder.build());

        prop_assert_eq!(&args[0], "-m");
        prop_assert_eq!(&args[1], &engine.max_memory_mb.to_string());
        prop_assert_eq!(&args[2], "-c");
        prop_assert_eq!(&args[4], "-t");
        prop_assert_eq!(&args[6], "-I");
        prop_assert_eq!(&args[7], &engine.max_item_size);

        let (rendered, tail) = args.split_at(args.len() - engine.extra_args.len());
        prop_assert_eq!(tail, engine.extra_args.as_slice());
        // Extra args may repeat engine flags, so only the rendered part is checked
        prop_assert_eq!(rendered.contains(&"-Y".to_string()), sasl);
        prop_assert_eq!(rendered.contains(&"-Z".to_string()), tls);
    }

    /// Autoscaled Deployments never carry a replica count.
    #[test]
    fn test_autoscaled_replicas_unset(replicas in 0..=50i32, min in 1..=5i32, extra in 0..=10i32) {
        let resource = MemcachedBuilder::new("cache")
            .replicas(replicas)
            .autoscaling(min, min + extra)
            .build();
        let deployment = generate_deployment(&resource, None);
        prop_assert_eq!(deployment.spec.unwrap().replicas, None);
    }

    /// The condition truth table holds for every replica combination.
    #[test]
    fn test_status_truth_table(desired in 0..=20i32, observed in any_observed()) {
        let conditions = compute_conditions(desired, Some(observed), false, Some(1), "now");

        let available = is_condition_true(&conditions, ConditionType::Available);
        let progressing = is_condition_true(&conditions, ConditionType::Progressing);
        let degraded = is_condition_true(&conditions, ConditionType::Degraded);

        prop_assert_eq!(available, observed.ready > 0 || desired == 0);
        prop_assert_eq!(
            progressing,
            observed.updated != observed.total || observed.total != desired
        );
        prop_assert_eq!(
            degraded,
            observed.ready != desired && !(desired == 0 && observed.ready == 0)
        );
        prop_assert_eq!(conditions.len(), 3);
    }

    /// Under an HPA the observed total is the desired count.
    #[test]
    fn test_hpa_status_ignores_spec(desired in 0..=20i32, observed in any_observed()) {
        let with_spec = compute_conditions(desired, Some(observed), true, Some(1), "now");
        let with_total = compute_conditions(observed.total, Some(observed), true, Some(1), "now");
        prop_assert_eq!(with_spec, with_total);
    }

    /// The fingerprint ignores input order and changes when data changes.
    #[test]
    fn test_fingerprint_stability(a in any_entries(), b in any_entries(), extra in "[a-z]{1,8}") {
        let build = |name: &str, entries: &[(String, String)]| {
            let pairs: Vec<(&str, &str)> = entries
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            secret("default", name, &pairs)
        };
        let sasl = build("sasl", &a);
        let tls = build("tls", &b);

        let forward = compute_secret_hash(&[sasl.clone(), tls.clone()]);
        let reverse = compute_secret_hash(&[tls.clone(), sasl.clone()]);
        prop_assert_eq!(&forward, &reverse);
        prop_assert_eq!(forward.len(), 64);

        // Generated keys are lowercase, so this one is always new
        let mut rotated = a.clone();
        rotated.push((format!("X{}", extra), extra.clone()));
        let changed = compute_secret_hash(&[build("sasl", &rotated), tls]);
        prop_assert_ne!(forward, changed);
    }
}
