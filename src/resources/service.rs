//! Service generation for Memcached.
//!
//! Creates a single headless Service so clients resolve every pod directly
//! and shard keys themselves.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::Memcached;
use crate::resources::common::{
    MEMCACHED_PORT, MEMCACHED_PORT_NAME, MEMCACHED_TLS_PORT, MEMCACHED_TLS_PORT_NAME,
    METRICS_PORT, METRICS_PORT_NAME, standard_labels,
};

/// Generate the headless Service for a Memcached.
pub fn generate_service(resource: &Memcached) -> Service {
    let labels = standard_labels(resource);
    let annotations = resource
        .spec
        .service
        .as_ref()
        .map(|s| s.annotations.clone())
        .filter(|a| !a.is_empty());

    let mut ports = vec![service_port(MEMCACHED_PORT, MEMCACHED_PORT_NAME)];
    if resource.tls().is_some() {
        ports.push(service_port(MEMCACHED_TLS_PORT, MEMCACHED_TLS_PORT_NAME));
    }
    if resource.monitoring_enabled() {
        ports.push(service_port(METRICS_PORT, METRICS_PORT_NAME));
    }

    Service {
        metadata: ObjectMeta {
            name: Some(resource.name_any()),
            namespace: resource.namespace(),
            labels: Some(labels.clone()),
            annotations,
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            // Headless service (no cluster IP)
            cluster_ip: Some("None".to_string()),
            selector: Some(labels),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Copy the desired Service state onto a live object.
///
/// Server-assigned spec fields (`clusterIPs`, `ipFamilies`, ...) are kept so
/// an unchanged Service compares equal after mutation.
pub fn apply_service(target: &mut Service, desired: Service) {
    target.metadata.labels = desired.metadata.labels;
    target.metadata.annotations = desired.metadata.annotations;
    let Some(desired_spec) = desired.spec else {
        return;
    };
    let spec = target.spec.get_or_insert_with(ServiceSpec::default);
    spec.cluster_ip = desired_spec.cluster_ip;
    spec.selector = desired_spec.selector;
    spec.ports = desired_spec.ports;
}

fn service_port(port: i32, name: &str) -> ServicePort {
    ServicePort {
        port,
        target_port: Some(IntOrString::String(name.to_string())),
        name: Some(name.to_string()),
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
    use crate::crd::{MemcachedSpec, MonitoringSpec, ServiceConfig};
    use std::collections::BTreeMap;

    fn test_resource(name: &str) -> Memcached {
        Memcached {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: MemcachedSpec::default(),
            status: None,
        }
    }

    #[test]
    fn test_headless_service() {
        let service = generate_service(&test_resource("cache"));
        let spec = service.spec.unwrap();

        assert_eq!(service.metadata.name, Some("cache".to_string()));
        assert_eq!(spec.cluster_ip, Some("None".to_string()));
        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, 11211);
        assert_eq!(ports[0].name, Some("memcached".to_string()));
        assert!(service.metadata.annotations.is_none());
    }

    #[test]
    fn test_metrics_port_with_monitoring() {
        let mut resource = test_resource("cache");
        resource.spec.monitoring = Some(MonitoringSpec {
            enabled: true,
            ..Default::default()
        });
        let ports = generate_service(&resource).spec.unwrap().ports.unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[1].port, 9150);
        assert_eq!(ports[1].name, Some("metrics".to_string()));
    }

    #[test]
    fn test_service_annotations() {
        let mut resource = test_resource("cache");
        let mut annotations = BTreeMap::new();
        annotations.insert("example.com/team".to_string(), "cache".to_string());
        resource.spec.service = Some(ServiceConfig { annotations });

        let service = generate_service(&resource);
        assert_eq!(
            service.metadata.annotations.unwrap().get("example.com/team"),
            Some(&"cache".to_string())
        );
    }

    #[test]
    fn test_apply_service_keeps_server_fields() {
        let resource = test_resource("cache");
        let mut live = generate_service(&resource);
        live.spec.as_mut().unwrap().ip_families = Some(vec!["IPv4".to_string()]);

        apply_service(&mut live, generate_service(&resource));
        assert_eq!(
            live.spec.unwrap().ip_families,
            Some(vec!["IPv4".to_string()])
        );
    }
}
