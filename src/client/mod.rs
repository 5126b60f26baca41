//! Kubernetes client module.
//!
//! - `object_store`: the [`ObjectStore`] seam the reconciler writes through,
//!   and its API-server implementation [`KubeStore`]

pub mod object_store;

pub use object_store::{FIELD_MANAGER, KubeStore, ManagedObject, ObjectStore};
