//! Sandbox provisioner capability consumed by the pool.
//!
//! The pool never talks to a container runtime directly. Everything it needs
//! from the substrate goes through [`SandboxProvisioner`], so backends (the
//! Docker CLI, a remote API, an in-memory fake) can be swapped without
//! touching pool logic.

use crate::error::ProvisionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Shared provisioner trait object.
pub type DynProvisioner = Arc<dyn SandboxProvisioner>;

/// Opaque reference to a sandbox owned by the provisioner (e.g. a container id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxHandle(String);

impl SandboxHandle {
    /// Wrap a provisioner-specific identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The provisioner-specific identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SandboxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runtime status of a sandbox as reported by the provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    /// The sandbox process is running.
    Running,
    /// The sandbox process has terminated.
    Exited,
    /// Any other state (created, paused, restarting, ...).
    Unknown,
}

impl SandboxStatus {
    /// Map a runtime status string onto a [`SandboxStatus`].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "running" => Self::Running,
            "exited" | "dead" => Self::Exited,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A plugin to be installed in the sandbox at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginRequirement {
    /// Plugin name as understood by the sandbox's startup command.
    pub name: String,
}

impl PluginRequirement {
    /// Create a plugin requirement by name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Ports requested for a new sandbox.
///
/// `None` asks the provisioner to allocate a free port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortRequirements {
    /// Port of the sandbox's control (action execution) server.
    pub control: Option<u16>,
    /// Port of the in-sandbox IDE server.
    pub ide: Option<u16>,
    /// Application ports exposed to the host.
    pub app: Option<Vec<u16>>,
}

/// A host directory bound into the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    /// Path inside the sandbox.
    pub bind: String,
    /// Mount mode, e.g. `rw` or `ro`.
    pub mode: String,
}

/// Everything the provisioner needs to create and start one sandbox.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    /// Name assigned to the sandbox.
    pub name: String,
    /// Plugins installed at startup.
    pub plugins: Vec<PluginRequirement>,
    /// Requested ports.
    pub ports: PortRequirements,
    /// Host path -> binding.
    pub volumes: HashMap<String, VolumeBinding>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
}

impl CreateRequest {
    /// A generic request: no volumes, no caller-specific environment,
    /// auto-allocated ports.
    pub fn generic(name: impl Into<String>, plugins: Vec<PluginRequirement>) -> Self {
        Self {
            name: name.into(),
            plugins,
            ..Default::default()
        }
    }
}

/// A started sandbox and the host ports assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedSandbox {
    /// Provisioner reference to the sandbox.
    pub handle: SandboxHandle,
    /// Control server port.
    pub control_port: u16,
    /// IDE server port.
    pub ide_port: u16,
    /// Application ports.
    pub app_ports: Vec<u16>,
}

/// Creates, inspects, renames, stops and removes single sandboxes.
///
/// All calls may block on I/O; the pool never invokes them while holding
/// its registry lock.
#[async_trait]
pub trait SandboxProvisioner: Send + Sync {
    /// Create and start a sandbox.
    async fn create(&self, request: CreateRequest) -> Result<ProvisionedSandbox, ProvisionError>;

    /// Query the current runtime status of a sandbox.
    async fn inspect(&self, handle: &SandboxHandle) -> Result<SandboxStatus, ProvisionError>;

    /// Rename a sandbox so external tooling can address it by its new name.
    async fn rename(&self, handle: &SandboxHandle, new_name: &str) -> Result<(), ProvisionError>;

    /// Stop a running sandbox.
    async fn stop(&self, handle: &SandboxHandle) -> Result<(), ProvisionError>;

    /// Remove a (stopped) sandbox and release its resources.
    async fn remove(&self, handle: &SandboxHandle) -> Result<(), ProvisionError>;
}

/// Stop then remove a sandbox, attempting removal even if stop fails.
///
/// Returns the first error encountered.
pub async fn destroy(
    provisioner: &dyn SandboxProvisioner,
    handle: &SandboxHandle,
) -> Result<(), ProvisionError> {
    let stopped = provisioner.stop(handle).await;
    if let Err(ref e) = stopped {
        tracing::debug!(handle = %handle, error = %e, "Stop failed, removing anyway");
    }
    let removed = provisioner.remove(handle).await;
    stopped.and(removed)
}
