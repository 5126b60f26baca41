//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 when ready to serve traffic)
//! - `/metrics` - Prometheus metrics endpoint

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

use crate::controller::context::MetricsSink;

/// Labels for reconciliation metrics (namespace + name)
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReconcileLabels {
    pub namespace: String,
    pub name: String,
}

impl EncodeLabelSet for ReconcileLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for owned-resource operation counters
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OperationLabels {
    pub kind: String,
    pub outcome: String,
}

impl EncodeLabelSet for OperationLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for the per-Memcached info gauge
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct InfoLabels {
    pub namespace: String,
    pub name: String,
    pub image: String,
}

impl EncodeLabelSet for InfoLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        ("image", self.image.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

fn reconcile_labels(namespace: &str, name: &str) -> ReconcileLabels {
    ReconcileLabels {
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

/// Shared metrics for the operator
pub struct Metrics {
    /// Total reconciliations counter
    pub reconciliations_total: Family<ReconcileLabels, Counter>,
    /// Failed reconciliations counter
    pub reconciliation_errors_total: Family<ReconcileLabels, Counter>,
    /// Reconciliation duration histogram
    pub reconcile_duration_seconds: Family<ReconcileLabels, Histogram>,
    /// Creates and updates of owned objects by kind and outcome
    pub resource_operations_total: Family<OperationLabels, Counter>,
    /// Desired replicas per Memcached
    pub memcached_replicas_desired: Family<ReconcileLabels, Gauge>,
    /// Ready replicas per Memcached
    pub memcached_replicas_ready: Family<ReconcileLabels, Gauge>,
    /// Constant 1, labelled with the running image
    pub memcached_info: Family<InfoLabels, Gauge>,
    /// Image currently exported in `memcached_info`, keyed by (namespace, name)
    info_images: Mutex<HashMap<(String, String), String>>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let reconciliations_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "memcached_operator_reconciliations",
            "Total number of reconciliations",
            reconciliations_total.clone(),
        );

        let reconciliation_errors_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "memcached_operator_reconciliation_errors",
            "Total number of reconciliation errors",
            reconciliation_errors_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<ReconcileLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "memcached_operator_reconcile_duration_seconds",
            "Duration of reconciliation in seconds",
            reconcile_duration_seconds.clone(),
        );

        let resource_operations_total = Family::<OperationLabels, Counter>::default();
        registry.register(
            "memcached_operator_resource_operations",
            "Owned objects created or updated, by kind and outcome",
            resource_operations_total.clone(),
        );

        let memcached_replicas_desired = Family::<ReconcileLabels, Gauge>::default();
        registry.register(
            "memcached_operator_memcached_replicas_desired",
            "Desired number of memcached pods for each Memcached",
            memcached_replicas_desired.clone(),
        );

        let memcached_replicas_ready = Family::<ReconcileLabels, Gauge>::default();
        registry.register(
            "memcached_operator_memcached_replicas_ready",
            "Number of ready memcached pods for each Memcached",
            memcached_replicas_ready.clone(),
        );

        let memcached_info = Family::<InfoLabels, Gauge>::default();
        registry.register(
            "memcached_operator_memcached_info",
            "Information about each Memcached",
            memcached_info.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            reconcile_duration_seconds,
            resource_operations_total,
            memcached_replicas_desired,
            memcached_replicas_ready,
            memcached_info,
            info_images: Mutex::new(HashMap::new()),
            registry,
        }
    }

    /// Record a successful reconciliation
    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        let labels = reconcile_labels(namespace, name);
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a failed reconciliation
    pub fn record_error(&self, namespace: &str, name: &str) {
        self.reconciliation_errors_total
            .get_or_create(&reconcile_labels(namespace, name))
            .inc();
    }

    /// Count a create or update of an owned object
    pub fn record_resource_operation(&self, kind: &str, outcome: &str) {
        let labels = OperationLabels {
            kind: kind.to_string(),
            outcome: outcome.to_string(),
        };
        self.resource_operations_total.get_or_create(&labels).inc();
    }

    /// Update replica and info gauges for a Memcached
    pub fn set_memcached_gauges(
        &self,
        namespace: &str,
        name: &str,
        desired: i64,
        ready: i64,
        image: &str,
    ) {
        let labels = reconcile_labels(namespace, name);
        self.memcached_replicas_desired
            .get_or_create(&labels)
            .set(desired);
        self.memcached_replicas_ready.get_or_create(&labels).set(ready);

        let key = (namespace.to_string(), name.to_string());
        if let Ok(mut images) = self.info_images.lock() {
            match images.insert(key, image.to_string()) {
                Some(previous) if previous != image => {
                    self.memcached_info.remove(&InfoLabels {
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                        image: previous,
                    });
                }
                _ => {}
            }
        }
        self.memcached_info
            .get_or_create(&InfoLabels {
                namespace: namespace.to_string(),
                name: name.to_string(),
                image: image.to_string(),
            })
            .set(1);
    }

    /// Remove every per-Memcached gauge
    pub fn forget_memcached(&self, namespace: &str, name: &str) {
        let labels = reconcile_labels(namespace, name);
        self.memcached_replicas_desired.remove(&labels);
        self.memcached_replicas_ready.remove(&labels);

        let key = (namespace.to_string(), name.to_string());
        let image = self
            .info_images
            .lock()
            .ok()
            .and_then(|mut images| images.remove(&key));
        if let Some(image) = image {
            self.memcached_info.remove(&InfoLabels {
                namespace: namespace.to_string(),
                name: name.to_string(),
                image,
            });
        }
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

impl MetricsSink for Metrics {
    fn record_resource_operation(&self, kind: &str, outcome: &str) {
        Metrics::record_resource_operation(self, kind, outcome);
    }

    fn set_memcached_gauges(
        &self,
        namespace: &str,
        name: &str,
        desired: i64,
        ready: i64,
        image: &str,
    ) {
        Metrics::set_memcached_gauges(self, namespace, name, desired, ready, image);
    }

    fn forget_memcached(&self, namespace: &str, name: &str) {
        Metrics::forget_memcached(self, namespace, name);
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the operator is ready (acquired leadership and running controller)
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
    /// Last successful reconcile timestamp (Unix epoch seconds)
    pub last_reconcile: AtomicU64,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
            last_reconcile: AtomicU64::new(0),
        }
    }

    /// Mark the operator as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the operator is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

impl MetricsSink for HealthState {
    fn record_resource_operation(&self, kind: &str, outcome: &str) {
        self.metrics.record_resource_operation(kind, outcome);
    }

    fn set_memcached_gauges(
        &self,
        namespace: &str,
        name: &str,
        desired: i64,
        ready: i64,
        image: &str,
    ) {
        self.metrics
            .set_memcached_gauges(namespace, name, desired, ready, image);
    }

    fn forget_memcached(&self, namespace: &str, name: &str) {
        self.metrics.forget_memcached(namespace, name);
    }
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive.
/// This is a simple check - if we can respond, we're alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 200 OK if the operator is ready to serve.
/// Returns 503 Service Unavailable if not ready.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server
///
/// Binds to 0.0.0.0:8080 and serves health/metrics endpoints.
pub async fn run_health_server(state: Arc<HealthState>) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], 8080));
    info!(port = 8080, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
