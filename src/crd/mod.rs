//! Custom Resource Definitions (CRDs) for memcached-operator.
//!
//! - `Memcached`: the user-authored resource this operator reconciles
//! - `ServiceMonitor`: the subset of the Prometheus Operator CRD the operator writes

mod memcached;
mod service_monitor;

pub use memcached::*;
pub use service_monitor::*;
