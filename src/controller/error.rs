//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.

use std::time::Duration;
use thiserror::Error;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// API error while reconciling one kind of owned resource
    #[error("failed to reconcile {kind}: {source}")]
    Resource {
        kind: &'static str,
        #[source]
        source: kube::Error,
    },

    /// Every create-or-update attempt hit a write conflict
    #[error("{kind} {name}: gave up after {attempts} conflicting writes")]
    ConflictRetriesExhausted {
        kind: &'static str,
        name: String,
        attempts: u32,
    },

    /// Rendering the desired state of an owned resource failed
    #[error("failed to render {kind}: {source}")]
    Mutation {
        kind: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Object is already controlled by another owner
    #[error("{kind} {name} is already controlled by {owner}")]
    OwnerConflict {
        kind: &'static str,
        name: String,
        owner: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an API error with the kind of resource being reconciled.
    pub fn resource(kind: &'static str, source: kube::Error) -> Self {
        Error::Resource { kind, source }
    }

    /// Wrap a failure while rendering the desired state of `kind`.
    pub fn mutation(kind: &'static str, source: impl Into<Error>) -> Self {
        Error::Mutation {
            kind,
            source: Box::new(source.into()),
        }
    }

    /// The underlying API error, if any.
    fn api_error(&self) -> Option<&kube::Error> {
        match self {
            Error::Kube(e) | Error::Resource { source: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        self.api_error().is_some_and(is_not_found)
    }

    /// Check if this error is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        self.api_error().is_some_and(is_conflict)
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) | Error::Resource { source: e, .. } => {
                // Retry on network errors, rate limiting, conflicts and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err)
                        if api_err.code >= 500 || api_err.code == 429 || api_err.code == 409
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::ConflictRetriesExhausted { .. } => true,
            Error::Mutation { source, .. } => source.is_retryable(),
            Error::MissingField(_) | Error::OwnerConflict { .. } | Error::Serialization(_) => {
                false
            }
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        if self.is_retryable() {
            Duration::from_secs(30)
        } else {
            // Don't requeue for non-retryable errors
            Duration::from_secs(3600)
        }
    }
}

/// Whether an API error is a 404.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}

/// Whether an API error is a 409 Conflict on resourceVersion.
///
/// A 409 with reason `AlreadyExists` is a create race, not a stale write, and
/// is reported separately by the API server; both are retried the same way.
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409)
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
