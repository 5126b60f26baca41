//! ServiceMonitor generation for the Prometheus Operator.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{Endpoint, Memcached, NamespaceSelector, ServiceMonitor, ServiceMonitorSpec};
use crate::resources::common::{METRICS_PORT_NAME, merge_labels, selector, standard_labels};

/// Default scrape interval.
pub const DEFAULT_SCRAPE_INTERVAL: &str = "30s";
/// Default scrape timeout.
pub const DEFAULT_SCRAPE_TIMEOUT: &str = "10s";

/// Generate a ServiceMonitor scraping the exporter sidecar.
///
/// Additional labels land on the ServiceMonitor's metadata only, and never
/// override the standard labels.
pub fn generate_service_monitor(resource: &Memcached) -> ServiceMonitor {
    let config = resource
        .spec
        .monitoring
        .as_ref()
        .and_then(|m| m.service_monitor.clone())
        .unwrap_or_default();

    let labels = merge_labels(&standard_labels(resource), &config.additional_labels);
    let name = resource.name_any();

    let mut monitor = ServiceMonitor::new(
        &name,
        ServiceMonitorSpec {
            selector: selector(resource),
            namespace_selector: Some(NamespaceSelector {
                match_names: resource.namespace().into_iter().collect(),
            }),
            endpoints: vec![Endpoint {
                port: Some(METRICS_PORT_NAME.to_string()),
                path: None,
                interval: Some(
                    config
                        .interval
                        .unwrap_or_else(|| DEFAULT_SCRAPE_INTERVAL.to_string()),
                ),
                scrape_timeout: Some(
                    config
                        .scrape_timeout
                        .unwrap_or_else(|| DEFAULT_SCRAPE_TIMEOUT.to_string()),
                ),
            }],
        },
    );
    monitor.metadata = ObjectMeta {
        name: Some(name),
        namespace: resource.namespace(),
        labels: Some(labels),
        ..Default::default()
    };
    monitor
}

/// Copy the desired ServiceMonitor state onto a live object.
pub fn apply_service_monitor(target: &mut ServiceMonitor, desired: ServiceMonitor) {
    target.metadata.labels = desired.metadata.labels;
    target.spec = desired.spec;
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
    use crate::crd::{MemcachedSpec, MonitoringSpec, ServiceMonitorConfig};
    use std::collections::BTreeMap;

    fn test_resource(config: ServiceMonitorConfig) -> Memcached {
        Memcached {
            metadata: ObjectMeta {
                name: Some("cache".to_string()),
                namespace: Some("team-a".to_string()),
                uid: Some("test-uid".to_string()),
                ..Default::default()
            },
            spec: MemcachedSpec {
                monitoring: Some(MonitoringSpec {
                    enabled: true,
                    service_monitor: Some(config),
                    ..Default::default()
                }),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn test_defaults() {
        let monitor = generate_service_monitor(&test_resource(ServiceMonitorConfig::default()));

        let endpoint = &monitor.spec.endpoints[0];
        assert_eq!(endpoint.port, Some("metrics".to_string()));
        assert_eq!(endpoint.interval, Some("30s".to_string()));
        assert_eq!(endpoint.scrape_timeout, Some("10s".to_string()));
        assert_eq!(
            monitor.spec.namespace_selector.unwrap().match_names,
            vec!["team-a".to_string()]
        );
    }

    #[test]
    fn test_additional_labels_stay_off_selector() {
        let mut additional_labels = BTreeMap::new();
        additional_labels.insert("release".to_string(), "prometheus".to_string());
        additional_labels.insert("app.kubernetes.io/name".to_string(), "other".to_string());

        let monitor = generate_service_monitor(&test_resource(ServiceMonitorConfig {
            interval: Some("15s".to_string()),
            scrape_timeout: None,
            additional_labels,
        }));

        let labels = monitor.metadata.labels.unwrap();
        assert_eq!(labels.get("release"), Some(&"prometheus".to_string()));
        assert_eq!(
            labels.get("app.kubernetes.io/name"),
            Some(&"memcached".to_string())
        );

        let selector_labels = monitor.spec.selector.match_labels.unwrap();
        assert!(!selector_labels.contains_key("release"));
        assert_eq!(monitor.spec.endpoints[0].interval, Some("15s".to_string()));
    }
}
