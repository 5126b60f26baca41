//! Resource generation module.
//!
//! Pure builders for the Kubernetes objects owned by a Memcached.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | Deployment | memcached pods, optional exporter sidecar |
//! | Service | Headless Service for client-side sharding |
//! | PodDisruptionBudget | Limit voluntary disruptions |
//! | ServiceMonitor | Prometheus Operator scrape config |
//! | NetworkPolicy | Restrict ingress to the memcached ports |
//! | HorizontalPodAutoscaler | Scale the Deployment on load |

pub mod common;
pub mod deployment;
pub mod hpa;
pub mod network_policy;
pub mod pdb;
pub mod service;
pub mod service_monitor;

// Re-export commonly used items from common
pub use common::{owner_reference, standard_labels};
