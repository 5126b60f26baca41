//! PodDisruptionBudget generation for Memcached.
//!
//! Limits voluntary disruptions (node drains, upgrades) so that a share of the
//! cache stays warm.

use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::Memcached;
use crate::resources::common::{selector, standard_labels};

/// Generate a PodDisruptionBudget for a Memcached.
///
/// `minAvailable` and `maxUnavailable` are exclusive. When both are set
/// `minAvailable` wins; when neither is set `minAvailable` defaults to 1.
pub fn generate_pod_disruption_budget(resource: &Memcached) -> PodDisruptionBudget {
    let config = resource
        .spec
        .high_availability
        .as_ref()
        .and_then(|ha| ha.pod_disruption_budget.as_ref());

    let min_available = config.and_then(|c| c.min_available.clone());
    let max_unavailable = config.and_then(|c| c.max_unavailable.clone());

    let (min_available, max_unavailable) = match (min_available, max_unavailable) {
        (Some(min), _) => (Some(min), None),
        (None, Some(max)) => (None, Some(max)),
        (None, None) => (Some(IntOrString::Int(1)), None),
    };

    PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(resource.name_any()),
            namespace: resource.namespace(),
            labels: Some(standard_labels(resource)),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            min_available,
            max_unavailable,
            selector: Some(selector(resource)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Copy the desired PodDisruptionBudget state onto a live object.
pub fn apply_pod_disruption_budget(target: &mut PodDisruptionBudget, desired: PodDisruptionBudget) {
    target.metadata.labels = desired.metadata.labels;
    let Some(desired_spec) = desired.spec else {
        return;
    };
    let spec = target
        .spec
        .get_or_insert_with(PodDisruptionBudgetSpec::default);
    spec.min_available = desired_spec.min_available;
    spec.max_unavailable = desired_spec.max_unavailable;
    spec.selector = desired_spec.selector;
}
