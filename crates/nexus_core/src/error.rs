//! Core error types.

use thiserror::Error;

/// Errors raised by the registry, module lifecycle and services.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required service is not registered. Fatal to the calling module's
    /// initialization path, never to the process.
    #[error("required service not found: {0}")]
    ServiceNotFound(String),

    /// A module lifecycle hook failed.
    #[error("module {name} {phase} failed: {reason}")]
    Lifecycle {
        name: String,
        phase: &'static str,
        reason: String,
    },

    /// Persistent store failure surfaced to a service method.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Anything else a module wants to surface from its hooks.
    #[error("{0}")]
    Other(String),
}

/// Errors from the persistent store collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),
}
