//! Error types for prewarm-docker.

use prewarm_core::ProvisionError;
use thiserror::Error;

/// Result type alias for prewarm-docker operations.
pub type Result<T> = std::result::Result<T, DockerError>;

/// Errors that can occur while driving the docker CLI.
#[derive(Debug, Error)]
pub enum DockerError {
    /// The docker binary could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The CLI ran but could not talk to the daemon
    #[error("docker daemon unavailable: {0}")]
    DaemonUnavailable(String),

    /// The CLI exited with a non-zero status
    #[error("docker {command} failed (exit {code:?}): {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// No runtime image is configured
    #[error("no runtime image configured")]
    MissingImage,

    /// No bindable port left in a range
    #[error("no free port in range {start}-{end}")]
    NoFreePort { start: u16, end: u16 },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl DockerError {
    /// Whether the daemon or the binary itself is out of reach.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::DaemonUnavailable(_))
    }
}

impl From<DockerError> for ProvisionError {
    fn from(err: DockerError) -> Self {
        if err.is_unreachable() {
            ProvisionError::Unreachable(err.to_string())
        } else {
            ProvisionError::Rejected(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let spawn = DockerError::Spawn {
            program: "docker".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(ProvisionError::from(spawn).is_transport());

        let daemon = DockerError::DaemonUnavailable("socket missing".into());
        assert!(ProvisionError::from(daemon).is_transport());

        let rejected = DockerError::Command {
            command: "rename".into(),
            code: Some(1),
            stderr: "Conflict. The container name is already in use".into(),
        };
        assert!(matches!(
            ProvisionError::from(rejected),
            ProvisionError::Rejected(msg) if msg.contains("Conflict")
        ));

        assert!(!ProvisionError::from(DockerError::MissingImage).is_transport());
    }
}
