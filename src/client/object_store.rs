//! Typed access to the Kubernetes object store.
//!
//! The reconciler only talks to the API server through [`ObjectStore`], so it
//! can run against [`KubeStore`] in production and an in-memory store in tests.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::crd::{Memcached, MemcachedStatus};

/// Field manager recorded on every write made by the operator.
pub const FIELD_MANAGER: &str = "memcached-operator";

/// Bound shared by every namespaced object the operator reads or writes.
pub trait ManagedObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> ManagedObject for T where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Get, create, replace and delete namespaced objects.
///
/// Errors are raw API errors; a stale `resourceVersion` on `replace` surfaces
/// as a 409 `Conflict`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `None` when it does not exist.
    async fn get<K: ManagedObject>(&self, namespace: &str, name: &str)
    -> kube::Result<Option<K>>;

    /// Create an object; the name and namespace come from its metadata.
    async fn create<K: ManagedObject>(&self, namespace: &str, obj: &K) -> kube::Result<K>;

    /// Replace an object, guarded by the `resourceVersion` in its metadata.
    async fn replace<K: ManagedObject>(
        &self,
        namespace: &str,
        name: &str,
        obj: &K,
    ) -> kube::Result<K>;

    /// Delete an object.
    async fn delete<K: ManagedObject>(&self, namespace: &str, name: &str) -> kube::Result<()>;

    /// Merge-patch the status subresource of a Memcached.
    async fn patch_memcached_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MemcachedStatus,
    ) -> kube::Result<()>;
}

/// [`ObjectStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a store over the given client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K: ManagedObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: ManagedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> kube::Result<Option<K>> {
        self.api::<K>(namespace).get_opt(name).await
    }

    async fn create<K: ManagedObject>(&self, namespace: &str, obj: &K) -> kube::Result<K> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api::<K>(namespace).create(&params, obj).await
    }

    async fn replace<K: ManagedObject>(
        &self,
        namespace: &str,
        name: &str,
        obj: &K,
    ) -> kube::Result<K> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api::<K>(namespace).replace(name, &params, obj).await
    }

    async fn delete<K: ManagedObject>(&self, namespace: &str, name: &str) -> kube::Result<()> {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }

    async fn patch_memcached_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MemcachedStatus,
    ) -> kube::Result<()> {
        let api: Api<Memcached> = self.api(namespace);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}
