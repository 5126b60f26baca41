//! HorizontalPodAutoscaler generation for Memcached.
//!
//! While autoscaling is enabled the Deployment's replica count is left unset
//! and the HPA is its only writer.

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HPAScalingPolicy, HPAScalingRules, HorizontalPodAutoscaler,
    HorizontalPodAutoscalerBehavior, HorizontalPodAutoscalerSpec, MetricSpec, MetricTarget,
    ResourceMetricSource,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::Memcached;
use crate::resources::common::standard_labels;

/// CPU utilization target used when no metrics are configured.
pub const DEFAULT_CPU_UTILIZATION: i32 = 80;
/// Scale-down stabilization window used when the scale-down rules set none.
pub const DEFAULT_SCALE_DOWN_STABILIZATION_SECONDS: i32 = 300;
/// Lower replica bound the API server assumes when `minReplicas` is unset.
pub const DEFAULT_MIN_REPLICAS: i32 = 1;

/// Generate a HorizontalPodAutoscaler targeting the memcached Deployment.
///
/// Unset scaling-rule fields are filled with the API server's defaults so
/// the rendered object matches what the server stores.
pub fn generate_hpa(resource: &Memcached) -> HorizontalPodAutoscaler {
    let name = resource.name_any();
    let autoscaling = resource.spec.autoscaling.clone().unwrap_or_default();

    let metrics = autoscaling
        .metrics
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| vec![default_cpu_metric()]);

    let behavior = autoscaling.behavior.unwrap_or_default();
    let mut scale_down = fill_scaling_rules(behavior.scale_down, default_scale_down_rules());
    scale_down
        .stabilization_window_seconds
        .get_or_insert(DEFAULT_SCALE_DOWN_STABILIZATION_SECONDS);
    let behavior = HorizontalPodAutoscalerBehavior {
        scale_up: Some(fill_scaling_rules(behavior.scale_up, default_scale_up_rules())),
        scale_down: Some(scale_down),
    };

    HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: resource.namespace(),
            labels: Some(standard_labels(resource)),
            ..Default::default()
        },
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name,
            },
            min_replicas: Some(autoscaling.min_replicas.unwrap_or(DEFAULT_MIN_REPLICAS)),
            max_replicas: autoscaling.max_replicas,
            metrics: Some(metrics),
            behavior: Some(behavior),
        }),
        ..Default::default()
    }
}

/// Copy the desired HorizontalPodAutoscaler state onto a live object.
pub fn apply_hpa(target: &mut HorizontalPodAutoscaler, desired: HorizontalPodAutoscaler) {
    target.metadata.labels = desired.metadata.labels;
    let Some(desired_spec) = desired.spec else {
        return;
    };
    let spec = target
        .spec
        .get_or_insert_with(HorizontalPodAutoscalerSpec::default);
    spec.scale_target_ref = desired_spec.scale_target_ref;
    spec.min_replicas = desired_spec.min_replicas;
    spec.max_replicas = desired_spec.max_replicas;
    spec.metrics = desired_spec.metrics;
    spec.behavior = desired_spec.behavior;
}

/// Overlay the fields set in `rules` onto `defaults`.
fn fill_scaling_rules(
    rules: Option<HPAScalingRules>,
    defaults: HPAScalingRules,
) -> HPAScalingRules {
    let Some(rules) = rules else {
        return defaults;
    };
    HPAScalingRules {
        policies: rules.policies.or(defaults.policies),
        select_policy: rules.select_policy.or(defaults.select_policy),
        stabilization_window_seconds: rules
            .stabilization_window_seconds
            .or(defaults.stabilization_window_seconds),
    }
}

fn scaling_policy(type_: &str, value: i32) -> HPAScalingPolicy {
    HPAScalingPolicy {
        type_: type_.to_string(),
        value,
        period_seconds: 15,
    }
}

fn default_scale_up_rules() -> HPAScalingRules {
    HPAScalingRules {
        policies: Some(vec![scaling_policy("Pods", 4), scaling_policy("Percent", 100)]),
        select_policy: Some("Max".to_string()),
        stabilization_window_seconds: Some(0),
    }
}

fn default_scale_down_rules() -> HPAScalingRules {
    HPAScalingRules {
        policies: Some(vec![scaling_policy("Percent", 100)]),
        select_policy: Some("Max".to_string()),
        stabilization_window_seconds: None,
    }
}

fn default_cpu_metric() -> MetricSpec {
    MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: "cpu".to_string(),
            target: MetricTarget {
                type_: "Utilization".to_string(),
                average_utilization: Some(DEFAULT_CPU_UTILIZATION),
                ..Default::default()
            },
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;
    use crate::crd::{AutoscalingSpec, MemcachedSpec};

    fn test_resource(autoscaling: AutoscalingSpec) -> Memcached {
        Memcached {
            metadata: ObjectMeta {
                name: Some("cache".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: MemcachedSpec {
                autoscaling: Some(autoscaling),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn test_defaults() {
        let hpa = generate_hpa(&test_resource(AutoscalingSpec {
            enabled: true,
            min_replicas: Some(2),
            max_replicas: 10,
            ..Default::default()
        }));
        let spec = hpa.spec.unwrap();

        assert_eq!(spec.scale_target_ref.kind, "Deployment");
        assert_eq!(spec.scale_target_ref.api_version, Some("apps/v1".to_string()));
        assert_eq!(spec.scale_target_ref.name, "cache");
        assert_eq!(spec.min_replicas, Some(2));
        assert_eq!(spec.max_replicas, 10);

        let metrics = spec.metrics.unwrap();
        assert_eq!(metrics.len(), 1);
        let cpu = metrics[0].resource.clone().unwrap();
        assert_eq!(cpu.name, "cpu");
        assert_eq!(cpu.target.average_utilization, Some(80));

        let scale_down = spec.behavior.unwrap().scale_down.unwrap();
        assert_eq!(scale_down.stabilization_window_seconds, Some(300));
    }

    #[test]
    fn test_unset_min_replicas_renders_api_default() {
        let hpa = generate_hpa(&test_resource(AutoscalingSpec {
            enabled: true,
            max_replicas: 5,
            ..Default::default()
        }));
        assert_eq!(hpa.spec.unwrap().min_replicas, Some(DEFAULT_MIN_REPLICAS));
    }

    #[test]
    fn test_default_rules_match_server_defaults() {
        let hpa = generate_hpa(&test_resource(AutoscalingSpec {
            enabled: true,
            max_replicas: 5,
            ..Default::default()
        }));
        let behavior = hpa.spec.unwrap().behavior.unwrap();

        let scale_up = behavior.scale_up.unwrap();
        assert_eq!(scale_up.stabilization_window_seconds, Some(0));
        assert_eq!(scale_up.select_policy.as_deref(), Some("Max"));
        assert_eq!(scale_up.policies.unwrap().len(), 2);

        let scale_down = behavior.scale_down.unwrap();
        assert_eq!(scale_down.select_policy.as_deref(), Some("Max"));
        assert_eq!(scale_down.policies.unwrap()[0].type_, "Percent");
    }

    #[test]
    fn test_scale_up_only_behavior_keeps_scale_down_window() {
        let behavior = HorizontalPodAutoscalerBehavior {
            scale_up: Some(HPAScalingRules {
                stabilization_window_seconds: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let hpa = generate_hpa(&test_resource(AutoscalingSpec {
            enabled: true,
            max_replicas: 4,
            behavior: Some(behavior),
            ..Default::default()
        }));

        let scale_down = hpa.spec.unwrap().behavior.unwrap().scale_down.unwrap();
        assert_eq!(
            scale_down.stabilization_window_seconds,
            Some(DEFAULT_SCALE_DOWN_STABILIZATION_SECONDS)
        );
    }

    #[test]
    fn test_removed_fields_revert_to_defaults() {
        let tuned = test_resource(AutoscalingSpec {
            enabled: true,
            min_replicas: Some(3),
            max_replicas: 5,
            behavior: Some(HorizontalPodAutoscalerBehavior {
                scale_down: Some(HPAScalingRules {
                    policies: Some(vec![scaling_policy("Pods", 1)]),
                    select_policy: Some("Min".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        let plain = test_resource(AutoscalingSpec {
            enabled: true,
            max_replicas: 5,
            ..Default::default()
        });

        let mut live = HorizontalPodAutoscaler::default();
        apply_hpa(&mut live, generate_hpa(&tuned));
        apply_hpa(&mut live, generate_hpa(&plain));

        assert_eq!(
            serde_json::to_value(&live.spec).unwrap(),
            serde_json::to_value(generate_hpa(&plain).spec).unwrap()
        );
    }

    #[test]
    fn test_custom_behavior_passes_through() {
        let behavior = HorizontalPodAutoscalerBehavior {
            scale_down: Some(HPAScalingRules {
                stabilization_window_seconds: Some(60),
                ..Default::default()
            }),
            ..Default::default()
        };
        let hpa = generate_hpa(&test_resource(AutoscalingSpec {
            enabled: true,
            max_replicas: 4,
            behavior: Some(behavior),
            ..Default::default()
        }));

        let scale_down = hpa.spec.unwrap().behavior.unwrap().scale_down.unwrap();
        assert_eq!(scale_down.stabilization_window_seconds, Some(60));
    }
}
