//! Docker provisioner configuration.

use crate::error::{DockerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

/// How sandboxes are started with the docker CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Path to the docker binary
    pub docker_path: PathBuf,
    /// Runtime image; creation is refused while unset
    pub image: Option<String>,
    /// Host address the published ports bind to
    pub bind_address: String,
    /// Share the host network instead of publishing ports
    pub use_host_network: bool,
    /// Working directory of the container process
    pub code_dir: String,
    /// Workspace passed to the control server
    pub workspace_dir: String,
    /// Control server command; port, workspace and plugins are appended
    pub server_command: Vec<String>,
    /// Environment added to every sandbox
    pub startup_env: HashMap<String, String>,
    /// Sets `DEBUG=true` inside sandboxes
    pub debug: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            docker_path: PathBuf::from("docker"),
            image: None,
            bind_address: "0.0.0.0".into(),
            use_host_network: false,
            code_dir: "/sandbox/code/".into(),
            workspace_dir: "/workspace".into(),
            server_command: vec![
                "python".into(),
                "-u".into(),
                "-m".into(),
                "sandbox.action_execution_server".into(),
            ],
            startup_env: HashMap::new(),
            debug: false,
        }
    }
}

impl DockerConfig {
    /// Default configuration running `image`.
    pub fn with_image(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            ..Default::default()
        }
    }

    /// Validate the configuration.
    ///
    /// A missing image is not an error here; creation reports it.
    pub fn validate(&self) -> Result<()> {
        if self.docker_path.as_os_str().is_empty() {
            return Err(DockerError::Config("docker_path must not be empty".into()));
        }
        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(DockerError::Config(format!(
                "bind_address is not an IP address: {}",
                self.bind_address
            )));
        }
        if self.server_command.is_empty() {
            return Err(DockerError::Config("server_command must not be empty".into()));
        }
        if matches!(&self.image, Some(image) if image.trim().is_empty()) {
            return Err(DockerError::Config("image must not be blank".into()));
        }
        Ok(())
    }
}
