//! Memcached Custom Resource Definition.
//!
//! Defines the Memcached CRD. Every optional block is an `Option` so that
//! "unset" stays distinguishable from an explicit value; builders apply the
//! documented defaults.

use std::collections::BTreeMap;

use k8s_openapi::api::autoscaling::v2::{HorizontalPodAutoscalerBehavior, MetricSpec};
use k8s_openapi::api::core::v1::{
    PodSecurityContext, ResourceRequirements, SecurityContext, TopologySpreadConstraint,
};
use k8s_openapi::api::networking::v1::NetworkPolicyPeer;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the Memcached CRD.
pub const API_GROUP: &str = "memcachedoperator.smoketurner.com";

/// API version of the Memcached CRD.
pub const API_VERSION: &str = "v1alpha1";

/// Annotation on the CR whose value is copied onto the pod template to force a rollout.
pub const RESTART_TRIGGER_ANNOTATION: &str = "memcachedoperator.smoketurner.com/restart-trigger";

/// Pod template annotation carrying the fingerprint of referenced secrets.
pub const SECRET_HASH_ANNOTATION: &str = "memcachedoperator.smoketurner.com/secret-hash";

/// Memcached is a custom resource for deploying memcached.
///
/// Example:
/// ```yaml
/// apiVersion: memcachedoperator.smoketurner.com/v1alpha1
/// kind: Memcached
/// metadata:
///   name: cache
/// spec:
///   replicas: 3
///   memcached:
///     maxMemoryMB: 256
///   monitoring:
///     enabled: true
///   highAvailability:
///     antiAffinityPreset: soft
///     podDisruptionBudget:
///       enabled: true
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "memcachedoperator.smoketurner.com",
    version = "v1alpha1",
    kind = "Memcached",
    plural = "memcacheds",
    shortname = "mc",
    status = "MemcachedStatus",
    namespaced,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Available", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MemcachedSpec {
    /// Number of memcached pods. Unset means 1; ignored while autoscaling is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Container image (default: memcached:1.6).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Memcached engine settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memcached: Option<MemcachedConfig>,

    /// Resource requests and limits for the memcached container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Metrics exporter sidecar and ServiceMonitor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringSpec>,

    /// Scheduling spread, disruption budget and shutdown behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailabilitySpec>,

    /// Security contexts, SASL, TLS and network policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecuritySpec>,

    /// HorizontalPodAutoscaler settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<AutoscalingSpec>,

    /// Extra settings for the headless Service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceConfig>,
}

/// Memcached engine configuration, rendered as command-line flags.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemcachedConfig {
    /// Memory ceiling in megabytes (-m, default 64).
    #[serde(default = "default_max_memory_mb", rename = "maxMemoryMB")]
    pub max_memory_mb: i32,

    /// Maximum simultaneous connections (-c, default 1024).
    #[serde(default = "default_max_connections")]
    pub max_connections: i32,

    /// Worker threads (-t, default 4).
    #[serde(default = "default_threads")]
    pub threads: i32,

    /// Maximum item size (-I, default 1m).
    #[serde(default = "default_max_item_size")]
    pub max_item_size: String,

    /// Logging verbosity: 0 quiet, 1 -v, 2 -vv.
    #[serde(default)]
    pub verbosity: i32,

    /// Additional arguments appended after all generated flags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: default_max_memory_mb(),
            max_connections: default_max_connections(),
            threads: default_threads(),
            max_item_size: default_max_item_size(),
            verbosity: 0,
            extra_args: Vec::new(),
        }
    }
}

fn default_max_memory_mb() -> i32 {
    64
}

fn default_max_connections() -> i32 {
    1024
}

fn default_threads() -> i32 {
    4
}

fn default_max_item_size() -> String {
    "1m".to_string()
}

/// Monitoring configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSpec {
    /// Run the exporter sidecar and expose the metrics port.
    #[serde(default)]
    pub enabled: bool,

    /// Exporter image (default: prom/memcached-exporter:v0.15.4).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter_image: Option<String>,

    /// Resource requests and limits for the exporter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exporter_resources: Option<ResourceRequirements>,

    /// ServiceMonitor settings. The ServiceMonitor exists only when this block is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_monitor: Option<ServiceMonitorConfig>,
}

/// Prometheus Operator ServiceMonitor settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorConfig {
    /// Scrape interval (default: 30s).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Scrape timeout (default: 10s).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_timeout: Option<String>,

    /// Labels added to the ServiceMonitor, e.g. to match a Prometheus selector.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_labels: BTreeMap<String, String>,
}

/// High availability configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HighAvailabilitySpec {
    /// Pod anti-affinity preset. Unset means no affinity at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_affinity_preset: Option<AntiAffinityPreset>,

    /// Topology spread constraints, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_spread_constraints: Option<Vec<TopologySpreadConstraint>>,

    /// Graceful shutdown timing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graceful_shutdown: Option<GracefulShutdownSpec>,

    /// PodDisruptionBudget settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_disruption_budget: Option<PodDisruptionBudgetConfig>,
}

/// Anti-affinity presets.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AntiAffinityPreset {
    /// Preferred spreading across nodes.
    Soft,
    /// Required spreading across nodes.
    Hard,
}

/// Graceful shutdown configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GracefulShutdownSpec {
    /// Add a preStop delay and pod termination grace period.
    #[serde(default)]
    pub enabled: bool,

    /// Seconds to sleep in the preStop hook (default: 10).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_stop_delay_seconds: Option<i32>,

    /// Pod termination grace period (default: 30).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,
}

/// PodDisruptionBudget configuration.
///
/// `minAvailable` and `maxUnavailable` are mutually exclusive; when both are
/// set `minAvailable` wins.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodDisruptionBudgetConfig {
    /// Create the PodDisruptionBudget.
    #[serde(default)]
    pub enabled: bool,

    /// Minimum available pods (default: 1 when neither field is set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<IntOrString>,

    /// Maximum unavailable pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,
}

/// Security configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySpec {
    /// Pod-level security context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,

    /// Container-level security context for memcached and the exporter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_security_context: Option<SecurityContext>,

    /// SASL authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sasl: Option<SaslSpec>,

    /// TLS listener.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSpec>,

    /// NetworkPolicy restricting ingress to the memcached pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_policy: Option<NetworkPolicyConfig>,
}

/// SASL configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaslSpec {
    /// Require SASL authentication.
    #[serde(default)]
    pub enabled: bool,

    /// Secret holding the `password-file` key.
    #[serde(default)]
    pub credentials_secret_ref: SecretReference,
}

/// TLS configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsSpec {
    /// Serve TLS on the secondary port.
    #[serde(default)]
    pub enabled: bool,

    /// Secret holding `tls.crt`, `tls.key` and optionally `ca.crt`.
    #[serde(default)]
    pub certificate_secret_ref: SecretReference,

    /// Verify client certificates against `ca.crt`.
    #[serde(default)]
    pub enable_client_cert: bool,
}

/// Reference to a Secret in the CR's namespace.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the Secret.
    pub name: String,
}

/// NetworkPolicy configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyConfig {
    /// Create the NetworkPolicy.
    #[serde(default)]
    pub enabled: bool,

    /// Peers allowed to connect. Empty allows every source on the memcached ports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_sources: Vec<NetworkPolicyPeer>,
}

/// Autoscaling configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingSpec {
    /// Create a HorizontalPodAutoscaler and hand replica ownership to it.
    #[serde(default)]
    pub enabled: bool,

    /// Lower replica bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    /// Upper replica bound.
    #[serde(default)]
    pub max_replicas: i32,

    /// Scaling metrics (default: CPU utilization at 80%).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<MetricSpec>>,

    /// Scaling behavior (default scale-down stabilization: 300s).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<HorizontalPodAutoscalerBehavior>,
}

/// Service configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Annotations added to the Service.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Status of a Memcached.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemcachedStatus {
    /// The generation most recently processed by the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Ready pods reported by the Deployment.
    #[serde(default)]
    pub ready_replicas: i32,

    /// Available, Progressing and Degraded.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Condition describes one aspect of the Memcached's health.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True" or "False").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition stamped with the given transition time.
    pub fn new(
        condition_type: ConditionType,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
        transition_time: &str,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: transition_time.to_string(),
            observed_generation: generation,
        }
    }

    /// Whether the condition status is "True".
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Types of conditions for Memcached.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ConditionType {
    /// At least one pod serves traffic, or zero pods are desired.
    Available,
    /// A rollout or scale operation is under way.
    Progressing,
    /// Fewer pods are ready than desired, or a referenced secret is missing.
    Degraded,
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionType::Available => write!(f, "Available"),
            ConditionType::Progressing => write!(f, "Progressing"),
            ConditionType::Degraded => write!(f, "Degraded"),
        }
    }
}

/// Default memcached image.
pub const DEFAULT_IMAGE: &str = "memcached:1.6";

/// Default metrics exporter image.
pub const DEFAULT_EXPORTER_IMAGE: &str = "prom/memcached-exporter:v0.15.4";

impl Memcached {
    /// Whether autoscaling owns the replica count.
    pub fn autoscaling_enabled(&self) -> bool {
        self.spec.autoscaling.as_ref().is_some_and(|a| a.enabled)
    }

    /// Whether the exporter sidecar and metrics port are enabled.
    pub fn monitoring_enabled(&self) -> bool {
        self.spec.monitoring.as_ref().is_some_and(|m| m.enabled)
    }

    /// Whether the ServiceMonitor should exist.
    pub fn service_monitor_enabled(&self) -> bool {
        self.spec
            .monitoring
            .as_ref()
            .is_some_and(|m| m.enabled && m.service_monitor.is_some())
    }

    /// Whether the PodDisruptionBudget should exist.
    pub fn pdb_enabled(&self) -> bool {
        self.spec
            .high_availability
            .as_ref()
            .and_then(|ha| ha.pod_disruption_budget.as_ref())
            .is_some_and(|pdb| pdb.enabled)
    }

    /// Whether the NetworkPolicy should exist.
    pub fn network_policy_enabled(&self) -> bool {
        self.spec
            .security
            .as_ref()
            .and_then(|s| s.network_policy.as_ref())
            .is_some_and(|np| np.enabled)
    }

    /// Enabled SASL settings, if any.
    pub fn sasl(&self) -> Option<&SaslSpec> {
        self.spec
            .security
            .as_ref()
            .and_then(|s| s.sasl.as_ref())
            .filter(|s| s.enabled)
    }

    /// Enabled TLS settings, if any.
    pub fn tls(&self) -> Option<&TlsSpec> {
        self.spec
            .security
            .as_ref()
            .and_then(|s| s.tls.as_ref())
            .filter(|t| t.enabled)
    }

    /// Replica count requested in the spec (unset means 1).
    pub fn spec_replicas(&self) -> i32 {
        self.spec.replicas.unwrap_or(1)
    }

    /// Container image, falling back to the default.
    pub fn image(&self) -> &str {
        self.spec.image.as_deref().unwrap_or(DEFAULT_IMAGE)
    }

    /// Names of every Secret referenced by enabled features.
    pub fn referenced_secret_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(sasl) = self.sasl() {
            names.push(sasl.credentials_secret_ref.name.clone());
        }
        if let Some(tls) = self.tls() {
            names.push(tls.certificate_secret_ref.name.clone());
        }
        names.sort();
        names.dedup();
        names
    }
}
