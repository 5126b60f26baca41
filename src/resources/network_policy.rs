//! NetworkPolicy generation for Memcached.

use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::Memcached;
use crate::resources::common::{
    MEMCACHED_PORT, MEMCACHED_TLS_PORT, METRICS_PORT, selector, standard_labels,
};

/// Generate a NetworkPolicy admitting ingress on the memcached ports.
///
/// An empty `allowedSources` list leaves `from` unset, which admits every peer.
pub fn generate_network_policy(resource: &Memcached) -> NetworkPolicy {
    let allowed_sources = resource
        .spec
        .security
        .as_ref()
        .and_then(|s| s.network_policy.as_ref())
        .map(|np| np.allowed_sources.clone())
        .unwrap_or_default();

    let mut ports = vec![tcp_port(MEMCACHED_PORT)];
    if resource.tls().is_some() {
        ports.push(tcp_port(MEMCACHED_TLS_PORT));
    }
    if resource.monitoring_enabled() {
        ports.push(tcp_port(METRICS_PORT));
    }

    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(resource.name_any()),
            namespace: resource.namespace(),
            labels: Some(standard_labels(resource)),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: selector(resource),
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: if allowed_sources.is_empty() {
                    None
                } else {
                    Some(allowed_sources)
                },
                ports: Some(ports),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Copy the desired NetworkPolicy state onto a live object.
pub fn apply_network_policy(target: &mut NetworkPolicy, desired: NetworkPolicy) {
    target.metadata.labels = desired.metadata.labels;
    target.spec = desired.spec;
}

fn tcp_port(port: i32) -> NetworkPolicyPort {
    NetworkPolicyPort {
        port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
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
    use crate::crd::{
        MemcachedSpec, MonitoringSpec, NetworkPolicyConfig, SecretReference, SecuritySpec,
        TlsSpec,
    };
    use k8s_openapi::api::networking::v1::NetworkPolicyPeer;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use std::collections::BTreeMap;

    fn test_resource(allowed_sources: Vec<NetworkPolicyPeer>, tls: bool) -> Memcached {
        Memcached {
            metadata: ObjectMeta {
                name: Some("cache".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: MemcachedSpec {
                security: Some(SecuritySpec {
                    network_policy: Some(NetworkPolicyConfig {
                        enabled: true,
                        allowed_sources,
                    }),
                    tls: tls.then(|| TlsSpec {
                        enabled: true,
                        certificate_secret_ref: SecretReference {
                            name: "certs".to_string(),
                        },
                        enable_client_cert: false,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            status: None,
        }
    }

    fn ports(policy: &NetworkPolicy) -> Vec<i32> {
        policy.spec.clone().unwrap().ingress.unwrap()[0]
            .ports
            .clone()
            .unwrap()
            .into_iter()
            .filter_map(|p| match p.port {
                Some(IntOrString::Int(port)) => Some(port),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_base_policy() {
        let policy = generate_network_policy(&test_resource(vec![], false));
        let spec = policy.spec.clone().unwrap();

        assert_eq!(spec.policy_types, Some(vec!["Ingress".to_string()]));
        assert!(spec.ingress.unwrap()[0].from.is_none());
        assert_eq!(ports(&policy), vec![11211]);
    }

    #[test]
    fn test_tls_and_monitoring_ports() {
        let mut resource = test_resource(vec![], true);
        resource.spec.monitoring = Some(MonitoringSpec {
            enabled: true,
            ..Default::default()
        });
        assert_eq!(
            ports(&generate_network_policy(&resource)),
            vec![11211, 11212, 9150]
        );
    }

    #[test]
    fn test_allowed_sources() {
        let mut match_labels = BTreeMap::new();
        match_labels.insert("role".to_string(), "frontend".to_string());
        let peer = NetworkPolicyPeer {
            pod_selector: Some(LabelSelector {
                match_labels: Some(match_labels),
                ..Default::default()
            }),
            ..Default::default()
        };

        let policy = generate_network_policy(&test_resource(vec![peer], false));
        let from = policy.spec.unwrap().ingress.unwrap()[0].from.clone().unwrap();
        assert_eq!(from.len(), 1);
    }
}
