//! Deployment generation for Memcached.
//!
//! Creates a Deployment running memcached with:
//! - Engine flags rendered from the spec in a fixed order
//! - Optional SASL and TLS secret mounts
//! - Optional metrics exporter sidecar
//! - Anti-affinity, topology spread and graceful shutdown settings
//! - Pod template annotations that roll pods on secret rotation or manual restart

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, ExecAction, KeyToPath, Lifecycle, LifecycleHandler,
    PodAffinityTerm, PodAntiAffinity, PodSecurityContext, PodSpec, PodTemplateSpec, Probe,
    SecretVolumeSource, SecurityContext, TCPSocketAction, Volume, VolumeMount,
    WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::{
    AntiAffinityPreset, DEFAULT_EXPORTER_IMAGE, Memcached, MemcachedConfig,
    RESTART_TRIGGER_ANNOTATION, SECRET_HASH_ANNOTATION,
};
use crate::resources::common::{
    MEMCACHED_PORT, MEMCACHED_PORT_NAME, MEMCACHED_TLS_PORT, MEMCACHED_TLS_PORT_NAME,
    METRICS_PORT, METRICS_PORT_NAME, instance_selector, selector, standard_labels,
};

/// Name of the memcached container.
pub const MEMCACHED_CONTAINER: &str = "memcached";
/// Name of the exporter sidecar.
pub const EXPORTER_CONTAINER: &str = "exporter";

/// Volume and mount for SASL credentials.
pub const SASL_VOLUME: &str = "sasl-credentials";
pub const SASL_MOUNT_PATH: &str = "/etc/memcached/sasl";
/// Key in the SASL secret projected as the password file.
pub const SASL_PASSWORD_FILE_KEY: &str = "password-file";

/// Volume and mount for TLS material.
pub const TLS_VOLUME: &str = "tls-certificates";
pub const TLS_MOUNT_PATH: &str = "/etc/memcached/tls";

/// Topology key used by the anti-affinity presets.
const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";
/// Weight of the soft anti-affinity term.
const SOFT_ANTI_AFFINITY_WEIGHT: i32 = 100;
/// Default preStop sleep in seconds.
const DEFAULT_PRE_STOP_DELAY_SECONDS: i32 = 10;
/// Mode the API server assigns to secret volume files (0644).
const SECRET_DEFAULT_MODE: i32 = 0o644;
/// Default pod termination grace period in seconds.
const DEFAULT_TERMINATION_GRACE_PERIOD_SECONDS: i64 = 30;

/// Generate the desired Deployment for a Memcached.
///
/// `secret_hash` is the fingerprint of the referenced SASL/TLS secrets; pass
/// `None` when no secrets are referenced.
pub fn generate_deployment(resource: &Memcached, secret_hash: Option<&str>) -> Deployment {
    let labels = standard_labels(resource);

    Deployment {
        metadata: ObjectMeta {
            name: Some(resource.name_any()),
            namespace: resource.namespace(),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: desired_replicas(resource),
            selector: selector(resource),
            template: generate_pod_template(resource, &labels, secret_hash),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Copy the desired Deployment state onto a live (or freshly zeroed) object.
///
/// Only fields the operator owns are assigned; values the API server
/// defaulted (strategy, DNS policy, termination message path, ...) stay as
/// read, so an unchanged Deployment compares equal after mutation. When the
/// desired replica count is unset the live value is kept, so the
/// HorizontalPodAutoscaler stays the only writer of `spec.replicas`.
pub fn apply_deployment(target: &mut Deployment, desired: Deployment) {
    target.metadata.labels = desired.metadata.labels;
    let Some(desired_spec) = desired.spec else {
        return;
    };
    let spec = target.spec.get_or_insert_with(DeploymentSpec::default);
    if desired_spec.replicas.is_some() {
        spec.replicas = desired_spec.replicas;
    }
    spec.selector = desired_spec.selector;
    apply_pod_template(&mut spec.template, desired_spec.template);
}

fn apply_pod_template(target: &mut PodTemplateSpec, desired: PodTemplateSpec) {
    let desired_meta = desired.metadata.unwrap_or_default();
    let meta = target.metadata.get_or_insert_with(ObjectMeta::default);
    meta.labels = desired_meta.labels;
    meta.annotations = desired_meta.annotations;

    let desired_pod = desired.spec.unwrap_or_default();
    let pod = target.spec.get_or_insert_with(PodSpec::default);

    let containers: Vec<Container> = desired_pod
        .containers
        .into_iter()
        .map(|container| {
            let live = pod.containers.iter().find(|c| c.name == container.name);
            inherit_container_defaults(container, live)
        })
        .collect();
    pod.containers = containers;
    pod.volumes = desired_pod.volumes;
    pod.affinity = desired_pod.affinity;
    pod.topology_spread_constraints = desired_pod.topology_spread_constraints;
    pod.termination_grace_period_seconds = desired_pod
        .termination_grace_period_seconds
        .or(Some(DEFAULT_TERMINATION_GRACE_PERIOD_SECONDS));
    let defaulted_security_context = pod
        .security_context
        .take()
        .filter(|sc| *sc == PodSecurityContext::default());
    pod.security_context = desired_pod
        .security_context
        .or(defaulted_security_context);
}

/// Keep the API server's defaults for container fields the builder leaves unset.
fn inherit_container_defaults(mut desired: Container, live: Option<&Container>) -> Container {
    if let Some(live) = live {
        if desired.image_pull_policy.is_none() {
            desired.image_pull_policy = live.image_pull_policy.clone();
        }
        if desired.termination_message_path.is_none() {
            desired.termination_message_path = live.termination_message_path.clone();
        }
        if desired.termination_message_policy.is_none() {
            desired.termination_message_policy = live.termination_message_policy.clone();
        }
    }
    desired
}

/// Replica count written to the Deployment.
///
/// `None` while autoscaling is enabled; otherwise the spec value (default 1).
pub fn desired_replicas(resource: &Memcached) -> Option<i32> {
    if resource.autoscaling_enabled() {
        None
    } else {
        Some(resource.spec_replicas())
    }
}

/// Annotations for the pod template.
///
/// The secret hash and the restart trigger are independent; `None` when neither applies.
pub fn pod_template_annotations(
    resource: &Memcached,
    secret_hash: Option<&str>,
) -> Option<BTreeMap<String, String>> {
    let mut annotations = BTreeMap::new();
    if let Some(hash) = secret_hash {
        annotations.insert(SECRET_HASH_ANNOTATION.to_string(), hash.to_string());
    }
    if let Some(trigger) = resource.annotations().get(RESTART_TRIGGER_ANNOTATION) {
        annotations.insert(RESTART_TRIGGER_ANNOTATION.to_string(), trigger.clone());
    }
    if annotations.is_empty() {
        None
    } else {
        Some(annotations)
    }
}

/// Generate the pod template for the Deployment.
fn generate_pod_template(
    resource: &Memcached,
    labels: &BTreeMap<String, String>,
    secret_hash: Option<&str>,
) -> PodTemplateSpec {
    let ha = resource.spec.high_availability.as_ref();
    let graceful = ha
        .and_then(|ha| ha.graceful_shutdown.as_ref())
        .filter(|g| g.enabled);

    let mut containers = vec![generate_memcached_container(resource)];
    if resource.monitoring_enabled() {
        containers.push(generate_exporter_container(resource));
    }

    let volumes = generate_volumes(resource);

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            annotations: pod_template_annotations(resource, secret_hash),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers,
            volumes: if volumes.is_empty() {
                None
            } else {
                Some(volumes)
            },
            affinity: generate_affinity(resource),
            topology_spread_constraints: ha
                .and_then(|ha| ha.topology_spread_constraints.clone()),
            termination_grace_period_seconds: graceful.map(|g| {
                g.termination_grace_period_seconds
                    .unwrap_or(DEFAULT_TERMINATION_GRACE_PERIOD_SECONDS)
            }),
            security_context: resource
                .spec
                .security
                .as_ref()
                .and_then(|s| s.pod_security_context.clone()),
            ..Default::default()
        }),
    }
}

/// Build the memcached argument list.
///
/// Order: memory, connections, threads, item size, verbosity, SASL, TLS, then
/// the user's extra arguments.
pub fn build_memcached_args(resource: &Memcached) -> Vec<String> {
    let default_config = MemcachedConfig::default();
    let config = resource.spec.memcached.as_ref().unwrap_or(&default_config);

    let mut args = vec![
        "-m".to_string(),
        config.max_memory_mb.to_string(),
        "-c".to_string(),
        config.max_connections.to_string(),
        "-t".to_string(),
        config.threads.to_string(),
        "-I".to_string(),
        config.max_item_size.clone(),
    ];

    match config.verbosity {
        v if v <= 0 => {}
        1 => args.push("-v".to_string()),
        _ => args.push("-vv".to_string()),
    }

    if resource.sasl().is_some() {
        args.push("-Y".to_string());
        args.push(format!("{}/{}", SASL_MOUNT_PATH, SASL_PASSWORD_FILE_KEY));
    }

    if let Some(tls) = resource.tls() {
        args.push("-Z".to_string());
        args.push("-o".to_string());
        args.push(format!("ssl_chain_cert={}/tls.crt", TLS_MOUNT_PATH));
        args.push("-o".to_string());
        args.push(format!("ssl_key={}/tls.key", TLS_MOUNT_PATH));
        if tls.enable_client_cert {
            args.push("-o".to_string());
            args.push(format!("ssl_ca_cert={}/ca.crt", TLS_MOUNT_PATH));
        }
    }

    args.extend(config.extra_args.iter().cloned());
    args
}

/// Generate the main memcached container.
fn generate_memcached_container(resource: &Memcached) -> Container {
    let mut ports = vec![ContainerPort {
        container_port: MEMCACHED_PORT,
        name: Some(MEMCACHED_PORT_NAME.to_string()),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }];
    if resource.tls().is_some() {
        ports.push(ContainerPort {
            container_port: MEMCACHED_TLS_PORT,
            name: Some(MEMCACHED_TLS_PORT_NAME.to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        });
    }

    let mounts = generate_volume_mounts(resource);

    Container {
        name: MEMCACHED_CONTAINER.to_string(),
        image: Some(resource.image().to_string()),
        args: Some(build_memcached_args(resource)),
        ports: Some(ports),
        resources: resource.spec.resources.clone(),
        volume_mounts: if mounts.is_empty() { None } else { Some(mounts) },
        security_context: container_security_context(resource),
        liveness_probe: Some(tcp_probe(10)),
        readiness_probe: Some(tcp_probe(5)),
        lifecycle: generate_lifecycle(resource),
        ..Default::default()
    }
}

/// Generate the metrics exporter sidecar.
fn generate_exporter_container(resource: &Memcached) -> Container {
    let monitoring = resource.spec.monitoring.as_ref();

    Container {
        name: EXPORTER_CONTAINER.to_string(),
        image: Some(
            monitoring
                .and_then(|m| m.exporter_image.clone())
                .unwrap_or_else(|| DEFAULT_EXPORTER_IMAGE.to_string()),
        ),
        args: Some(vec![format!(
            "--memcached.address=localhost:{}",
            MEMCACHED_PORT
        )]),
        ports: Some(vec![ContainerPort {
            container_port: METRICS_PORT,
            name: Some(METRICS_PORT_NAME.to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: monitoring.and_then(|m| m.exporter_resources.clone()),
        security_context: container_security_context(resource),
        ..Default::default()
    }
}

fn container_security_context(resource: &Memcached) -> Option<SecurityContext> {
    resource
        .spec
        .security
        .as_ref()
        .and_then(|s| s.container_security_context.clone())
}

/// TCP probe against the memcached port.
fn tcp_probe(initial_delay_seconds: i32) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::String(MEMCACHED_PORT_NAME.to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

/// preStop hook delaying termination so endpoints drain first.
fn generate_lifecycle(resource: &Memcached) -> Option<Lifecycle> {
    let graceful = resource
        .spec
        .high_availability
        .as_ref()
        .and_then(|ha| ha.graceful_shutdown.as_ref())
        .filter(|g| g.enabled)?;

    let delay = graceful
        .pre_stop_delay_seconds
        .unwrap_or(DEFAULT_PRE_STOP_DELAY_SECONDS);

    Some(Lifecycle {
        pre_stop: Some(LifecycleHandler {
            exec: Some(ExecAction {
                command: Some(vec![
                    "/bin/sh".to_string(),
                    "-c".to_string(),
                    format!("sleep {}", delay),
                ]),
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Pod anti-affinity from the configured preset.
///
/// Returns `None` (not an empty `Affinity`) when no preset is set.
fn generate_affinity(resource: &Memcached) -> Option<Affinity> {
    let preset = resource
        .spec
        .high_availability
        .as_ref()
        .and_then(|ha| ha.anti_affinity_preset)?;

    let term = PodAffinityTerm {
        label_selector: Some(instance_selector(resource)),
        topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
        ..Default::default()
    };

    let anti_affinity = match preset {
        AntiAffinityPreset::Soft => PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: SOFT_ANTI_AFFINITY_WEIGHT,
                    pod_affinity_term: term,
                },
            ]),
            ..Default::default()
        },
        AntiAffinityPreset::Hard => PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![term]),
            ..Default::default()
        },
    };

    Some(Affinity {
        pod_anti_affinity: Some(anti_affinity),
        ..Default::default()
    })
}

/// Generate secret volumes for SASL and TLS.
fn generate_volumes(resource: &Memcached) -> Vec<Volume> {
    let mut volumes = Vec::new();

    if let Some(sasl) = resource.sasl() {
        volumes.push(Volume {
            name: SASL_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(sasl.credentials_secret_ref.name.clone()),
                items: Some(vec![key_to_path(SASL_PASSWORD_FILE_KEY)]),
                default_mode: Some(SECRET_DEFAULT_MODE),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    if let Some(tls) = resource.tls() {
        let mut items = vec![key_to_path("tls.crt"), key_to_path("tls.key")];
        if tls.enable_client_cert {
            items.push(key_to_path("ca.crt"));
        }
        volumes.push(Volume {
            name: TLS_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(tls.certificate_secret_ref.name.clone()),
                items: Some(items),
                default_mode: Some(SECRET_DEFAULT_MODE),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    volumes
}

fn key_to_path(key: &str) -> KeyToPath {
    KeyToPath {
        key: key.to_string(),
        path: key.to_string(),
        ..Default::default()
    }
}

/// Generate volume mounts for the memcached container.
fn generate_volume_mounts(resource: &Memcached) -> Vec<VolumeMount> {
    let mut mounts = Vec::new();
    if resource.sasl().is_some() {
        mounts.push(VolumeMount {
            name: SASL_VOLUME.to_string(),
            mount_path: SASL_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }
    if resource.tls().is_some() {
        mounts.push(VolumeMount {
            name: TLS_VOLUME.to_string(),
            mount_path: TLS_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }
    mounts
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
        AutoscalingSpec, GracefulShutdownSpec, HighAvailabilitySpec, MemcachedSpec,
        MonitoringSpec, SaslSpec, SecretReference, SecuritySpec, TlsSpec,
    };

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

    fn pod_spec(deployment: &Deployment) -> PodSpec {
        deployment.spec.clone().unwrap().template.spec.unwrap()
    }

    fn with_security(mut resource: Memcached, sasl: bool, tls: bool, client_cert: bool) -> Memcached {
        resource.spec.security = Some(SecuritySpec {
            sasl: sasl.then(|| SaslSpec {
                enabled: true,
                credentials_secret_ref: SecretReference {
                    name: "sasl-secret".to_string(),
                },
            }),
            tls: tls.then(|| TlsSpec {
                enabled: true,
                certificate_secret_ref: SecretReference {
                    name: "tls-secret".to_string(),
                },
                enable_client_cert: client_cert,
            }),
            ..Default::default()
        });
        resource
    }

    #[test]
    fn test_generate_deployment_defaults() {
        let deployment = generate_deployment(&test_resource("cache"), None);

        assert_eq!(deployment.metadata.name, Some("cache".to_string()));
        let spec = deployment.spec.clone().unwrap();
        assert_eq!(spec.replicas, Some(1));

        let pod = pod_spec(&deployment);
        assert_eq!(pod.containers.len(), 1);
        assert_eq!(pod.containers[0].image, Some("memcached:1.6".to_string()));
        assert!(pod.affinity.is_none());
        assert!(pod.volumes.is_none());
        assert!(pod.termination_grace_period_seconds.is_none());
        assert!(deployment.spec.unwrap().template.metadata.unwrap().annotations.is_none());
    }

    #[test]
    fn test_explicit_replicas() {
        let mut resource = test_resource("cache");
        resource.spec.replicas = Some(3);
        assert_eq!(desired_replicas(&resource), Some(3));
    }

    #[test]
    fn test_autoscaling_unsets_replicas() {
        let mut resource = test_resource("cache");
        resource.spec.replicas = Some(3);
        resource.spec.autoscaling = Some(AutoscalingSpec {
            enabled: true,
            max_replicas: 10,
            ..Default::default()
        });
        assert_eq!(desired_replicas(&resource), None);
    }

    #[test]
    fn test_apply_deployment_keeps_live_replicas_when_unset() {
        let mut resource = test_resource("cache");
        resource.spec.autoscaling = Some(AutoscalingSpec {
            enabled: true,
            max_replicas: 10,
            ..Default::default()
        });
        let mut live = generate_deployment(&test_resource("cache"), None);
        live.spec.as_mut().unwrap().replicas = Some(7);

        apply_deployment(&mut live, generate_deployment(&resource, None));
        assert_eq!(live.spec.unwrap().replicas, Some(7));
    }

    #[test]
    fn test_apply_deployment_keeps_server_defaults() {
        let resource = test_resource("cache");
        let mut live = Deployment::default();
        apply_deployment(&mut live, generate_deployment(&resource, None));

        let pod = live.spec.as_mut().unwrap().template.spec.as_mut().unwrap();
        pod.dns_policy = Some("ClusterFirst".to_string());
        pod.security_context = Some(PodSecurityContext::default());
        pod.containers[0].termination_message_path = Some("/dev/termination-log".to_string());
        let before = serde_json::to_value(&live).unwrap();

        apply_deployment(&mut live, generate_deployment(&resource, None));
        assert_eq!(serde_json::to_value(&live).unwrap(), before);
    }

    #[test]
    fn test_apply_deployment_removes_disabled_affinity() {
        let mut resource = test_resource("cache");
        resource.spec.high_availability = Some(HighAvailabilitySpec {
            anti_affinity_preset: Some(AntiAffinityPreset::Hard),
            ..Default::default()
        });
        let mut live = Deployment::default();
        apply_deployment(&mut live, generate_deployment(&resource, None));

        resource.spec.high_availability = None;
        apply_deployment(&mut live, generate_deployment(&resource, None));
        assert!(pod_spec(&live).affinity.is_none());
    }

    #[test]
    fn test_default_args() {
        let args = build_memcached_args(&test_resource("cache"));
        assert_eq!(args, vec!["-m", "64", "-c", "1024", "-t", "4", "-I", "1m"]);
    }

    #[test]
    fn test_verbosity_flags() {
        let mut resource = test_resource("cache");
        resource.spec.memcached = Some(MemcachedConfig {
            verbosity: 1,
            ..Default::default()
        });
        assert_eq!(build_memcached_args(&resource).last().unwrap(), "-v");

        resource.spec.memcached = Some(MemcachedConfig {
            verbosity: 2,
            ..Default::default()
        });
        assert_eq!(build_memcached_args(&resource).last().unwrap(), "-vv");
    }

    #[test]
    fn test_args_order_with_security_and_extra_args() {
        let mut resource = with_security(test_resource("cache"), true, true, true);
        resource.spec.memcached = Some(MemcachedConfig {
            verbosity: 1,
            extra_args: vec!["-o".to_string(), "modern".to_string()],
            ..Default::default()
        });

        let args = build_memcached_args(&resource);
        assert_eq!(
            args,
            vec![
                "-m",
                "64",
                "-c",
                "1024",
                "-t",
                "4",
                "-I",
                "1m",
                "-v",
                "-Y",
                "/etc/memcached/sasl/password-file",
                "-Z",
                "-o",
                "ssl_chain_cert=/etc/memcached/tls/tls.crt",
                "-o",
                "ssl_key=/etc/memcached/tls/tls.key",
                "-o",
                "ssl_ca_cert=/etc/memcached/tls/ca.crt",
                "-o",
                "modern",
            ]
        );
    }

    #[test]
    fn test_tls_without_client_cert_omits_ca() {
        let resource = with_security(test_resource("cache"), false, true, false);
        let args = build_memcached_args(&resource);
        assert!(!args.iter().any(|a| a.contains("ssl_ca_cert")));

        let pod = pod_spec(&generate_deployment(&resource, None));
        let volumes = pod.volumes.unwrap();
        assert_eq!(volumes.len(), 1);
        let items = volumes[0].secret.clone().unwrap().items.unwrap();
        assert_eq!(items.len(), 2);

        let ports = pod.containers[0].ports.clone().unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[1].container_port, 11212);
    }

    #[test]
    fn test_sasl_volume_and_mount() {
        let resource = with_security(test_resource("cache"), true, false, false);
        let pod = pod_spec(&generate_deployment(&resource, None));

        let volumes = pod.volumes.unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, SASL_VOLUME);
        let secret = volumes[0].secret.clone().unwrap();
        assert_eq!(secret.secret_name, Some("sasl-secret".to_string()));
        assert_eq!(secret.items.unwrap()[0].key, "password-file");

        let mounts = pod.containers[0].volume_mounts.clone().unwrap();
        assert_eq!(mounts[0].mount_path, SASL_MOUNT_PATH);
        assert_eq!(mounts[0].read_only, Some(true));
    }

    #[test]
    fn test_monitoring_adds_exporter() {
        let mut resource = test_resource("cache");
        resource.spec.monitoring = Some(MonitoringSpec {
            enabled: true,
            ..Default::default()
        });
        let pod = pod_spec(&generate_deployment(&resource, None));

        assert_eq!(pod.containers.len(), 2);
        assert_eq!(pod.containers[1].name, EXPORTER_CONTAINER);
        assert_eq!(
            pod.containers[1].image,
            Some(DEFAULT_EXPORTER_IMAGE.to_string())
        );
        assert!(pod.volumes.is_none());
    }

    #[test]
    fn test_soft_anti_affinity() {
        let mut resource = test_resource("cache");
        resource.spec.high_availability = Some(HighAvailabilitySpec {
            anti_affinity_preset: Some(AntiAffinityPreset::Soft),
            ..Default::default()
        });
        let anti = pod_spec(&generate_deployment(&resource, None))
            .affinity
            .unwrap()
            .pod_anti_affinity
            .unwrap();

        let preferred = anti
            .preferred_during_scheduling_ignored_during_execution
            .unwrap();
        assert_eq!(preferred.len(), 1);
        assert_eq!(preferred[0].weight, 100);
        assert_eq!(
            preferred[0].pod_affinity_term.topology_key,
            "kubernetes.io/hostname"
        );
        assert!(anti.required_during_scheduling_ignored_during_execution.is_none());
    }

    #[test]
    fn test_hard_anti_affinity() {
        let mut resource = test_resource("cache");
        resource.spec.high_availability = Some(HighAvailabilitySpec {
            anti_affinity_preset: Some(AntiAffinityPreset::Hard),
            ..Default::default()
        });
        let anti = pod_spec(&generate_deployment(&resource, None))
            .affinity
            .unwrap()
            .pod_anti_affinity
            .unwrap();

        assert_eq!(
            anti.required_during_scheduling_ignored_during_execution
                .unwrap()
                .len(),
            1
        );
        assert!(anti.preferred_during_scheduling_ignored_during_execution.is_none());
    }

    #[test]
    fn test_graceful_shutdown_defaults() {
        let mut resource = test_resource("cache");
        resource.spec.high_availability = Some(HighAvailabilitySpec {
            graceful_shutdown: Some(GracefulShutdownSpec {
                enabled: true,
                ..Default::default()
            }),
            ..Default::default()
        });
        let pod = pod_spec(&generate_deployment(&resource, None));

        assert_eq!(pod.termination_grace_period_seconds, Some(30));
        let command = pod.containers[0]
            .lifecycle
            .clone()
            .unwrap()
            .pre_stop
            .unwrap()
            .exec
            .unwrap()
            .command
            .unwrap();
        assert_eq!(command[2], "sleep 10");
    }

    #[test]
    fn test_graceful_shutdown_disabled() {
        let mut resource = test_resource("cache");
        resource.spec.high_availability = Some(HighAvailabilitySpec {
            graceful_shutdown: Some(GracefulShutdownSpec {
                enabled: false,
                pre_stop_delay_seconds: Some(20),
                termination_grace_period_seconds: Some(60),
            }),
            ..Default::default()
        });
        let pod = pod_spec(&generate_deployment(&resource, None));
        assert!(pod.termination_grace_period_seconds.is_none());
        assert!(pod.containers[0].lifecycle.is_none());
    }

    #[test]
    fn test_pod_template_annotations() {
        let mut resource = test_resource("cache");
        assert!(pod_template_annotations(&resource, None).is_none());

        resource
            .annotations_mut()
            .insert(RESTART_TRIGGER_ANNOTATION.to_string(), "2026-10-16".to_string());
        let annotations = pod_template_annotations(&resource, Some("abc")).unwrap();
        assert_eq!(annotations.get(SECRET_HASH_ANNOTATION), Some(&"abc".to_string()));
        assert_eq!(
            annotations.get(RESTART_TRIGGER_ANNOTATION),
            Some(&"2026-10-16".to_string())
        );
    }

    #[test]
    fn test_generate_deployment_deterministic() {
        let mut resource = with_security(test_resource("cache"), true, true, true);
        resource.spec.monitoring = Some(MonitoringSpec {
            enabled: true,
            ..Default::default()
        });
        let first = serde_json::to_string(&generate_deployment(&resource, Some("h"))).unwrap();
        let second = serde_json::to_string(&generate_deployment(&resource, Some("h"))).unwrap();
        assert_eq!(first, second);
    }
}
