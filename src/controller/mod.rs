//! Controller module for memcached-operator.
//!
//! Contains the reconciliation loop, the create-or-update primitive, secret
//! fingerprinting, error handling and status management.

pub mod context;
pub mod error;
pub mod mutator;
pub mod reconciler;
pub mod secrets;
pub mod status;
