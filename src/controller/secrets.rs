//! Resolution and fingerprinting of the Secrets a Memcached references.
//!
//! The fingerprint lands on the pod template, so rotating a SASL or TLS secret
//! rolls the pods even though the Deployment spec is otherwise unchanged.

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::client::ObjectStore;
use crate::controller::error::{Error, Result};
use crate::crd::Memcached;

/// Secrets referenced by a Memcached, split into found and missing.
#[derive(Clone, Debug, Default)]
pub struct ResolvedSecrets {
    /// Secrets that exist, sorted by name.
    pub found: Vec<Secret>,
    /// Names of referenced secrets that do not exist, sorted.
    pub missing: Vec<String>,
}

impl ResolvedSecrets {
    /// Fingerprint of the found secrets; `None` when nothing is referenced.
    pub fn hash(&self) -> Option<String> {
        if self.found.is_empty() && self.missing.is_empty() {
            return None;
        }
        Some(compute_secret_hash(&self.found))
    }
}

/// Fetch every Secret referenced by enabled SASL and TLS settings.
///
/// A missing secret is not an error: it is reported in `missing` and the
/// caller degrades the resource's status instead.
pub async fn resolve_secrets<S: ObjectStore>(
    store: &S,
    resource: &Memcached,
) -> Result<ResolvedSecrets> {
    let namespace = resource
        .namespace()
        .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;

    let mut resolved = ResolvedSecrets::default();
    for name in resource.referenced_secret_names() {
        match store
            .get::<Secret>(&namespace, &name)
            .await
            .map_err(|e| Error::resource("Secret", e))?
        {
            Some(secret) => resolved.found.push(secret),
            None => {
                warn!(
                    name = %resource.name_any(),
                    namespace = %namespace,
                    secret = %name,
                    "Referenced secret not found"
                );
                resolved.missing.push(name);
            }
        }
    }
    Ok(resolved)
}

/// SHA-256 over secrets in name order.
///
/// Each secret contributes its name, then every `data` key and value in key
/// order. Every field is prefixed with its big-endian u64 length, since
/// values are arbitrary bytes. Output is lowercase hex.
pub fn compute_secret_hash(secrets: &[Secret]) -> String {
    let mut sorted: Vec<&Secret> = secrets.iter().collect();
    sorted.sort_by_key(|s| s.name_any());

    let mut hasher = Sha256::new();
    for secret in sorted {
        update_field(&mut hasher, secret.name_any().as_bytes());
        if let Some(data) = &secret.data {
            for (key, value) in data {
                update_field(&mut hasher, key.as_bytes());
                update_field(&mut hasher, &value.0);
            }
        }
    }
    hex::encode(hasher.finalize())
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
