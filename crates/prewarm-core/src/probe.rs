//! Readiness probing for freshly created sandboxes.
//!
//! A sandbox is considered ready once its control server answers a GET on
//! the liveness path with a 2xx status. [`ReadinessProber`] polls that check
//! on a fixed interval until a wall-clock deadline, and gives up early when
//! the provisioner reports the sandbox has exited.

use crate::config::ProbeConfig;
use crate::error::{PoolError, Result};
use crate::provisioner::{SandboxHandle, SandboxProvisioner, SandboxStatus};
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Client, Uri};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout, Instant};

/// Why a single liveness check failed.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    /// Connection refused, reset or otherwise broken.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request did not complete within the per-request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with a non-2xx status.
    #[error("unexpected status {0}")]
    Status(u16),

    /// The liveness URL could not be built.
    #[error("invalid liveness url: {0}")]
    InvalidUri(String),
}

/// One liveness check against a control port.
#[async_trait]
pub trait LivenessCheck: Send + Sync {
    /// Succeeds if the control server on `port` is alive.
    async fn check(&self, port: u16) -> std::result::Result<(), ProbeFailure>;
}

/// [`LivenessCheck`] issuing an HTTP GET to `<runtime_url>:<port><path>`.
pub struct HttpLivenessCheck {
    client: Client<HttpConnector>,
    runtime_url: String,
    liveness_path: String,
    request_timeout: Duration,
}

impl HttpLivenessCheck {
    /// Create a checker from the probe configuration.
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            client: Client::new(),
            runtime_url: config.runtime_url.trim_end_matches('/').to_string(),
            liveness_path: config.liveness_path.clone(),
            request_timeout: config.request_timeout,
        }
    }

    /// URL probed for the given control port.
    pub fn url_for(&self, port: u16) -> String {
        format!("{}:{}{}", self.runtime_url, port, self.liveness_path)
    }
}

#[async_trait]
impl LivenessCheck for HttpLivenessCheck {
    async fn check(&self, port: u16) -> std::result::Result<(), ProbeFailure> {
        let url = self.url_for(port);
        let uri: Uri = url
            .parse()
            .map_err(|e| ProbeFailure::InvalidUri(format!("{url}: {e}")))?;

        tracing::trace!(url = %url, "Sending liveness request");
        let response = match timeout(self.request_timeout, self.client.get(uri)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ProbeFailure::Connect(e.to_string())),
            Err(_) => return Err(ProbeFailure::Timeout(self.request_timeout)),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeFailure::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Waits for a sandbox's control endpoint to become ready.
#[derive(Clone)]
pub struct ReadinessProber {
    check: Arc<dyn LivenessCheck>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ReadinessProber {
    /// Prober using HTTP liveness checks.
    pub fn http(config: &ProbeConfig) -> Self {
        Self::with_check(Arc::new(HttpLivenessCheck::new(config)), config)
    }

    /// Prober using a custom liveness check.
    pub fn with_check(check: Arc<dyn LivenessCheck>, config: &ProbeConfig) -> Self {
        Self {
            check,
            poll_interval: config.poll_interval,
            max_wait: config.max_wait,
        }
    }

    /// Block until the sandbox answers its liveness check.
    ///
    /// After every failed check the sandbox is inspected; an exited sandbox
    /// fails immediately. Any other failure is retried every poll interval
    /// until `max_wait` has elapsed.
    ///
    /// # Errors
    ///
    /// [`PoolError::SandboxExited`] if the sandbox terminated,
    /// [`PoolError::ReadinessTimeout`] if the deadline passed.
    pub async fn wait_ready(
        &self,
        provisioner: &dyn SandboxProvisioner,
        handle: &SandboxHandle,
        name: &str,
        port: u16,
    ) -> Result<()> {
        let start = Instant::now();
        let deadline = start + self.max_wait;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let failure = match self.check.check(port).await {
                Ok(()) => {
                    tracing::debug!(
                        sandbox = %name,
                        port,
                        attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Sandbox ready"
                    );
                    return Ok(());
                }
                Err(failure) => failure,
            };

            match provisioner.inspect(handle).await {
                Ok(SandboxStatus::Exited) => {
                    tracing::warn!(sandbox = %name, error = %failure, "Sandbox exited while waiting for readiness");
                    return Err(PoolError::SandboxExited {
                        name: name.to_string(),
                    });
                }
                Ok(status) => {
                    tracing::trace!(sandbox = %name, attempt = attempts, %status, error = %failure, "Not ready yet, retrying...");
                }
                Err(e) => {
                    tracing::trace!(sandbox = %name, attempt = attempts, error = %e, "Inspect failed while probing");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    sandbox = %name,
                    port,
                    attempts,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Sandbox readiness timeout"
                );
                return Err(PoolError::ReadinessTimeout(self.max_wait));
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
