// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for memcached-operator.
//!
//! These tests run without a Kubernetes cluster and test individual
//! components through the public API.

mod crd_tests {
    use kube::CustomResourceExt;
    use memcached_operator::crd::{
        AntiAffinityPreset, Condition, ConditionType, Memcached, MemcachedSpec, MemcachedStatus,
    };

    #[test]
    fn test_condition_type_display() {
        assert_eq!(ConditionType::Available.to_string(), "Available");
        assert_eq!(ConditionType::Progressing.to_string(), "Progressing");
        assert_eq!(ConditionType::Degraded.to_string(), "Degraded");
    }

    #[test]
    fn test_condition_false() {
        let condition = Condition::new(
            ConditionType::Degraded,
            false,
            "NotDegraded",
            "All desired replicas ready",
            Some(1),
            "2026-01-01T00:00:00Z",
        );
        assert_eq!(condition.r#type, "Degraded");
        assert_eq!(condition.status, "False");
        assert!(!condition.is_true());
    }

    #[test]
    fn test_spec_uses_camel_case() {
        let spec: MemcachedSpec = serde_json::from_value(serde_json::json!({
            "replicas": 3,
            "memcached": {"maxMemoryMB": 256, "maxConnections": 2048, "extraArgs": ["-R", "40"]},
            "highAvailability": {
                "antiAffinityPreset": "soft",
                "podDisruptionBudget": {"enabled": true, "maxUnavailable": "25%"}
            },
            "security": {"sasl": {"enabled": true, "credentialsSecretRef": {"name": "creds"}}}
        }))
        .unwrap();

        assert_eq!(spec.replicas, Some(3));
        let engine = spec.memcached.unwrap();
        assert_eq!(engine.max_memory_mb, 256);
        assert_eq!(engine.max_connections, 2048);
        assert_eq!(engine.extra_args, vec!["-R".to_string(), "40".to_string()]);
        let ha = spec.high_availability.unwrap();
        assert_eq!(ha.anti_affinity_preset, Some(AntiAffinityPreset::Soft));
        assert!(ha.pod_disruption_budget.unwrap().enabled);
        let sasl = spec.security.unwrap().sasl.unwrap();
        assert_eq!(sasl.credentials_secret_ref.name, "creds");
    }

    #[test]
    fn test_unset_blocks_are_omitted() {
        let value = serde_json::to_value(MemcachedSpec::default()).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn test_status_serialization() {
        let status = MemcachedStatus {
            observed_generation: Some(3),
            ready_replicas: 2,
            conditions: vec![],
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["observedGeneration"], 3);
        assert_eq!(value["readyReplicas"], 2);
    }

    #[test]
    fn test_crd_definition() {
        let crd = Memcached::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("memcacheds.memcachedoperator.smoketurner.com")
        );
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.names.kind, "Memcached");
        assert_eq!(
            crd.spec.names.short_names,
            Some(vec!["mc".to_string()])
        );
        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(version.subresources.as_ref().unwrap().status.is_some());
    }

    #[test]
    fn test_shared_secret_is_referenced_once() {
        let spec: MemcachedSpec = serde_json::from_value(serde_json::json!({
            "security": {
                "sasl": {"enabled": true, "credentialsSecretRef": {"name": "shared"}},
                "tls": {"enabled": true, "certificateSecretRef": {"name": "shared"}}
            }
        }))
        .unwrap();
        let resource = Memcached::new("cache", spec);
        assert_eq!(resource.referenced_secret_names(), vec!["shared".to_string()]);
    }
}

mod error_tests {
    use memcached_operator::controller::error::Error;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "error".to_string(),
            reason: "Error".to_string(),
            code,
        })
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::Kube(api_error(504)).is_retryable());
        assert!(Error::resource("Deployment", api_error(409)).is_retryable());
        assert!(!Error::resource("Deployment", api_error(422)).is_retryable());
        assert!(!Error::MissingField("metadata.uid".to_string()).is_retryable());
    }

    #[test]
    fn test_error_names_kind() {
        let err = Error::ConflictRetriesExhausted {
            kind: "Service",
            name: "cache".to_string(),
            attempts: 5,
        };
        assert!(err.to_string().contains("Service cache"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_found() {
        assert!(Error::resource("Secret", api_error(404)).is_not_found());
        assert!(!Error::resource("Secret", api_error(500)).is_not_found());
    }
}

mod status_tests {
    use memcached_operator::controller::status::{
        ObservedReplicas, REASON_DEPLOYMENT_NOT_FOUND, build_status, is_condition_true,
    };
    use memcached_operator::crd::{Condition, ConditionType, Memcached, MemcachedSpec};

    const NOW: &str = "2026-01-01T00:00:00Z";

    fn resource(replicas: i32) -> Memcached {
        let mut resource = Memcached::new(
            "cache",
            MemcachedSpec {
                replicas: Some(replicas),
                ..Default::default()
            },
        );
        resource.metadata.generation = Some(4);
        resource
    }

    #[test]
    fn test_build_status_steady() {
        let observed = ObservedReplicas {
            ready: 3,
            updated: 3,
            total: 3,
        };
        let status = build_status(&resource(3), Some(observed), &[], NOW);

        assert_eq!(status.observed_generation, Some(4));
        assert_eq!(status.ready_replicas, 3);
        assert_eq!(status.conditions.len(), 3);
        assert!(is_condition_true(&status.conditions, ConditionType::Available));
        assert!(!is_condition_true(&status.conditions, ConditionType::Progressing));
        assert!(!is_condition_true(&status.conditions, ConditionType::Degraded));
    }

    #[test]
    fn test_build_status_without_deployment() {
        let status = build_status(&resource(3), None, &[], NOW);

        assert_eq!(status.ready_replicas, 0);
        assert!(
            status
                .conditions
                .iter()
                .all(|c| c.reason == REASON_DEPLOYMENT_NOT_FOUND)
        );
    }

    #[test]
    fn test_is_condition_true_missing() {
        let conditions: Vec<Condition> = vec![];
        assert!(!is_condition_true(&conditions, ConditionType::Available));
    }
}

mod resource_tests {
    use memcached_operator::crd::{Memcached, MemcachedSpec};
    use memcached_operator::resources::deployment::{build_memcached_args, generate_deployment};
    use memcached_operator::resources::service::generate_service;

    fn resource() -> Memcached {
        let mut resource = Memcached::new("cache", MemcachedSpec::default());
        resource.metadata.namespace = Some("default".to_string());
        resource
    }

    #[test]
    fn test_default_args() {
        assert_eq!(
            build_memcached_args(&resource()),
            vec!["-m", "64", "-c", "1024", "-t", "4", "-I", "1m"]
        );
    }

    #[test]
    fn test_default_deployment() {
        let deployment = generate_deployment(&resource(), None);
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(1));
        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.containers.len(), 1);
        assert_eq!(pod.containers[0].image.as_deref(), Some("memcached:1.6"));
    }

    #[test]
    fn test_service_targets_pods() {
        let service = generate_service(&resource());
        let spec = service.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        let selector = spec.selector.unwrap();
        assert_eq!(
            selector.get("app.kubernetes.io/instance"),
            Some(&"cache".to_string())
        );
    }
}
