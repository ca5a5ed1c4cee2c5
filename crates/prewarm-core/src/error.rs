//! Error types for prewarm-core.

use crate::entry::EntryId;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for prewarm-core operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors reported by a [`SandboxProvisioner`](crate::SandboxProvisioner).
///
/// The two variants separate a substrate that cannot be reached at all from
/// one that answered and refused the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    /// The provisioning substrate could not be reached (daemon down, socket missing).
    #[error("provisioner unreachable: {0}")]
    Unreachable(String),

    /// The substrate answered but rejected the request (name conflict, missing image, ...).
    #[error("provisioning rejected: {0}")]
    Rejected(String),
}

impl ProvisionError {
    /// Whether this is a transport-level failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Errors that can occur while creating or tracking pooled sandboxes.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Error from the sandbox provisioner
    #[error("provisioner error: {0}")]
    Provision(#[from] ProvisionError),

    /// Sandbox terminated before its control endpoint became ready
    #[error("sandbox {name} exited before becoming ready")]
    SandboxExited {
        /// Name of the sandbox that exited
        name: String,
    },

    /// Control endpoint did not answer within the readiness deadline
    #[error("sandbox not ready after {0:?}")]
    ReadinessTimeout(Duration),

    /// An entry with the same id is already registered
    #[error("duplicate pool entry id: {0}")]
    DuplicateId(EntryId),

    /// The pool is shutting down and accepts no new entries
    #[error("pool is shutting down")]
    ShuttingDown,
}

/// Pool configuration validation error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_batch must be > 0")]
    ZeroBatch,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("liveness path must start with '/': {0}")]
    InvalidLivenessPath(String),

    #[error("invalid runtime url: {0}")]
    InvalidRuntimeUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every failure a pool operation can produce comes from provisioning,
    /// readiness or registry state; configuration is rejected earlier.
    fn origin(err: &PoolError) -> &'static str {
        match err {
            PoolError::Provision(_) => "provisioner",
            PoolError::SandboxExited { .. } | PoolError::ReadinessTimeout(_) => "readiness",
            PoolError::DuplicateId(_) | PoolError::ShuttingDown => "registry",
        }
    }

    #[test]
    fn test_pool_error_origins() {
        let err: PoolError = ProvisionError::Unreachable("daemon down".into()).into();
        assert_eq!(origin(&err), "provisioner");
        assert_eq!(err.to_string(), "provisioner error: provisioner unreachable: daemon down");

        let err = PoolError::ReadinessTimeout(Duration::from_secs(60));
        assert_eq!(origin(&err), "readiness");
        assert_eq!(origin(&PoolError::DuplicateId(EntryId::new())), "registry");
        assert_eq!(origin(&PoolError::ShuttingDown), "registry");
    }

    #[test]
    fn test_transport_classification() {
        assert!(ProvisionError::Unreachable("x".into()).is_transport());
        assert!(!ProvisionError::Rejected("x".into()).is_transport());
    }
}
