//! Thin async wrapper around the docker binary.

use crate::error::{DockerError, Result};
use std::path::PathBuf;
use tokio::process::Command;

/// stderr fragments printed when the CLI cannot reach the daemon.
const DAEMON_UNAVAILABLE: &[&str] = &[
    "Cannot connect to the Docker daemon",
    "error during connect",
    "Is the docker daemon running",
];

/// Runs docker subcommands and returns their trimmed stdout.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
}

impl DockerCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `docker <args>`.
    ///
    /// # Errors
    /// [`DockerError::Spawn`] if the binary cannot be started,
    /// [`DockerError::DaemonUnavailable`] if it cannot reach the daemon and
    /// [`DockerError::Command`] for any other non-zero exit.
    pub async fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<String> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        let command = args.first().copied().unwrap_or_default().to_string();
        tracing::trace!(program = %self.program.display(), ?args, "Running docker command");

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DockerError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::debug!(command = %command, code = ?output.status.code(), stderr = %stderr, "docker command failed");
        Err(classify_failure(command, output.status.code(), stderr))
    }
}

fn classify_failure(command: String, code: Option<i32>, stderr: String) -> DockerError {
    if DAEMON_UNAVAILABLE.iter().any(|needle| stderr.contains(needle)) {
        DockerError::DaemonUnavailable(stderr)
    } else {
        DockerError::Command {
            command,
            code,
            stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_messages_are_unreachable() {
        let err = classify_failure(
            "ps".into(),
            Some(1),
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?".into(),
        );
        assert!(err.is_unreachable());
    }

    #[test]
    fn test_other_failures_are_commands() {
        let err = classify_failure(
            "inspect".into(),
            Some(1),
            "Error: No such object: abc".into(),
        );
        assert!(matches!(err, DockerError::Command { code: Some(1), .. }));
        assert!(!err.is_unreachable());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let cli = DockerCli::new("/nonexistent/prewarm-docker-binary");
        let err = cli.run(&["version"]).await.unwrap_err();
        assert!(matches!(err, DockerError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_is_trimmed() {
        let cli = DockerCli::new("echo");
        assert_eq!(cli.run(&["  abc123  "]).await.unwrap(), "abc123");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit() {
        let cli = DockerCli::new("false");
        let err = cli.run(&["rename"]).await.unwrap_err();
        assert!(matches!(
            err,
            DockerError::Command { ref command, code: Some(1), .. } if command == "rename"
        ));
    }
}
