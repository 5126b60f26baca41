//! Shared context for the controller.
//!
//! The Context struct holds shared state that is passed to the reconciler:
//! the object store, the event sink and the metrics sink.

use std::sync::Arc;

use async_trait::async_trait;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};

use crate::client::{FIELD_MANAGER, KubeStore};
use crate::crd::Memcached;
use crate::health::HealthState;

/// Severity of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// An event about a Memcached, independent of how it is delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorEvent {
    pub kind: EventKind,
    /// Machine-readable reason, e.g. `Created`.
    pub reason: String,
    /// What the operator did, e.g. `Reconcile`.
    pub action: String,
    pub note: Option<String>,
}

impl OperatorEvent {
    /// A normal event.
    pub fn normal(reason: &str, action: &str, note: Option<String>) -> Self {
        Self {
            kind: EventKind::Normal,
            reason: reason.to_string(),
            action: action.to_string(),
            note,
        }
    }

    /// A warning event.
    pub fn warning(reason: &str, action: &str, note: Option<String>) -> Self {
        Self {
            kind: EventKind::Warning,
            reason: reason.to_string(),
            action: action.to_string(),
            note,
        }
    }
}

/// Destination for events attached to a Memcached.
///
/// Publishing is best-effort; implementations log failures and never return them.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, resource: &Memcached, event: OperatorEvent);
}

/// Destination for per-resource metrics.
pub trait MetricsSink: Send + Sync {
    /// Count a successful create or update of an owned object.
    fn record_resource_operation(&self, kind: &str, outcome: &str);

    /// Set the per-Memcached replica and info gauges.
    fn set_memcached_gauges(
        &self,
        namespace: &str,
        name: &str,
        desired: i64,
        ready: i64,
        image: &str,
    );

    /// Drop every per-Memcached gauge once the resource is gone.
    fn forget_memcached(&self, namespace: &str, name: &str);
}

/// [`EventSink`] publishing Kubernetes events through a [`Recorder`].
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    /// Create a sink reporting as the operator (and this pod, when `POD_NAME` is set).
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.into(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, resource: &Memcached, event: OperatorEvent) {
        let object_ref = resource.object_ref(&());
        let type_ = match event.kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        };
        if let Err(e) = self
            .recorder
            .publish(
                &Event {
                    type_,
                    reason: event.reason.clone(),
                    note: event.note,
                    action: event.action,
                    secondary: None,
                },
                &object_ref,
            )
            .await
        {
            tracing::warn!(reason = %event.reason, error = %e, "Failed to publish event");
        }
    }
}

/// Shared context for the controller
pub struct Context<S = KubeStore> {
    /// Object store used for every read and write
    pub store: S,
    /// Event destination
    events: Arc<dyn EventSink>,
    /// Optional metrics destination
    metrics: Option<Arc<dyn MetricsSink>>,
    /// Optional health state for reconcile metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
}

impl Context<KubeStore> {
    /// Create a new context
    pub fn new(client: Client, health_state: Option<Arc<HealthState>>) -> Self {
        let metrics = health_state
            .clone()
            .map(|state| state as Arc<dyn MetricsSink>);
        Self {
            store: KubeStore::new(client.clone()),
            events: Arc::new(KubeEventSink::new(client)),
            metrics,
            health_state,
        }
    }
}

impl<S> Context<S> {
    /// Assemble a context from its parts.
    pub fn from_parts(
        store: S,
        events: Arc<dyn EventSink>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Self {
        Self {
            store,
            events,
            metrics,
            health_state: None,
        }
    }

    /// Publish an event for a resource
    pub async fn publish_event(&self, resource: &Memcached, event: OperatorEvent) {
        self.events.publish(resource, event).await;
    }

    /// Publish a normal event for a resource
    pub async fn publish_normal_event(
        &self,
        resource: &Memcached,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish_event(resource, OperatorEvent::normal(reason, action, note))
            .await;
    }

    /// Publish a warning event for a resource
    pub async fn publish_warning_event(
        &self,
        resource: &Memcached,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish_event(resource, OperatorEvent::warning(reason, action, note))
            .await;
    }

    /// The metrics sink, if metrics are enabled.
    pub fn metrics(&self) -> Option<&dyn MetricsSink> {
        self.metrics.as_deref()
    }
}
