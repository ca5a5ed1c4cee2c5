//! [`SandboxProvisioner`] backed by the docker CLI.

use crate::cli::DockerCli;
use crate::config::DockerConfig;
use crate::error::{DockerError, Result};
use crate::ports::{self, APP_PORTS_1, APP_PORTS_2, CONTROL_PORTS, IDE_PORTS};
use async_trait::async_trait;
use prewarm_core::{
    CreateRequest, ProvisionError, ProvisionedSandbox, SandboxHandle, SandboxProvisioner,
    SandboxStatus,
};

/// Host ports assigned to one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedPorts {
    pub control: u16,
    pub ide: u16,
    pub app: Vec<u16>,
}

impl AssignedPorts {
    /// Use the ports the request asks for, allocating the rest.
    pub fn allocate(request: &CreateRequest) -> Result<Self> {
        let requested = &request.ports;
        let control = match requested.control {
            Some(port) => port,
            None => ports::find_available_port(CONTROL_PORTS)?,
        };
        let ide = match requested.ide {
            Some(port) => port,
            None => ports::find_available_port(IDE_PORTS)?,
        };
        let app = match &requested.app {
            Some(app) => app.clone(),
            None => vec![
                ports::find_available_port(APP_PORTS_1)?,
                ports::find_available_port(APP_PORTS_2)?,
            ],
        };
        Ok(Self { control, ide, app })
    }

    fn all(&self) -> impl Iterator<Item = u16> + '_ {
        [self.control, self.ide].into_iter().chain(self.app.iter().copied())
    }
}

/// Starts sandboxes as detached containers.
///
/// # Example
///
/// ```no_run
/// use prewarm_docker::{DockerConfig, DockerProvisioner};
///
/// let provisioner = DockerProvisioner::new(DockerConfig::with_image("runtime:latest"))?;
/// # Ok::<(), prewarm_docker::DockerError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DockerProvisioner {
    config: DockerConfig,
    cli: DockerCli,
}

impl DockerProvisioner {
    /// Create a provisioner after validating `config`.
    pub fn new(config: DockerConfig) -> Result<Self> {
        config.validate()?;
        let cli = DockerCli::new(config.docker_path.clone());
        Ok(Self { config, cli })
    }

    pub fn config(&self) -> &DockerConfig {
        &self.config
    }

    /// Arguments for `docker run` starting `request` on `ports`.
    pub fn run_args(&self, image: &str, request: &CreateRequest, ports: &AssignedPorts) -> Vec<String> {
        let config = &self.config;
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            request.name.clone(),
            "-w".into(),
            config.code_dir.clone(),
            "--entrypoint".into(),
            String::new(),
        ];

        for (key, value) in environment(config, request, ports) {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }

        if config.use_host_network {
            args.push("--network".into());
            args.push("host".into());
        } else {
            for port in ports.all() {
                args.push("-p".into());
                args.push(format!("{}:{port}:{port}/tcp", config.bind_address));
            }
        }

        let mut volumes: Vec<_> = request.volumes.iter().collect();
        volumes.sort_by(|a, b| a.0.cmp(b.0));
        for (host, binding) in volumes {
            args.push("-v".into());
            args.push(format!("{host}:{}:{}", binding.bind, binding.mode));
        }

        args.push(image.to_string());
        args.extend(config.server_command.iter().cloned());
        args.push(ports.control.to_string());
        args.push("--working-dir".into());
        args.push(config.workspace_dir.clone());
        if !request.plugins.is_empty() {
            args.push("--plugins".into());
            args.extend(request.plugins.iter().map(|p| p.name.clone()));
        }
        args
    }

    async fn create_container(&self, request: CreateRequest) -> Result<ProvisionedSandbox> {
        let image = self.config.image.as_deref().ok_or(DockerError::MissingImage)?;
        let ports = AssignedPorts::allocate(&request)?;
        let args = self.run_args(image, &request, &ports);

        tracing::debug!(
            name = %request.name,
            image = %image,
            control_port = ports.control,
            "Starting sandbox container"
        );
        let id = self.cli.run(&args).await.map_err(|e| {
            tracing::error!(name = %request.name, error = %e, "Error creating container");
            e
        })?;

        let handle = id.lines().last().unwrap_or_default().trim().to_string();
        if handle.is_empty() {
            return Err(DockerError::Command {
                command: "run".into(),
                code: Some(0),
                stderr: "no container id printed".into(),
            });
        }
        tracing::info!(name = %request.name, container = %handle, "Sandbox container started");

        Ok(ProvisionedSandbox {
            handle: SandboxHandle::new(handle),
            control_port: ports.control,
            ide_port: ports.ide,
            app_ports: ports.app,
        })
    }
}

/// Container environment. Later sources override earlier ones.
fn environment(
    config: &DockerConfig,
    request: &CreateRequest,
    ports: &AssignedPorts,
) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = Vec::new();
    let mut set = |key: &str, value: String| {
        env.retain(|(k, _)| k != key);
        env.push((key.to_string(), value));
    };

    let mut requested: Vec<_> = request.env.iter().collect();
    requested.sort();
    for (key, value) in requested {
        set(key, value.clone());
    }

    set("port", ports.control.to_string());
    set("PYTHONUNBUFFERED", "1".into());
    set("VSCODE_PORT", ports.ide.to_string());
    for (i, port) in ports.app.iter().enumerate() {
        set(&format!("APP_PORT_{}", i + 1), port.to_string());
    }
    set("PIP_BREAK_SYSTEM_PACKAGES", "1".into());
    if config.debug {
        set("DEBUG", "true".into());
    }

    let mut startup: Vec<_> = config.startup_env.iter().collect();
    startup.sort();
    for (key, value) in startup {
        set(key, value.clone());
    }
    env
}

#[async_trait]
impl SandboxProvisioner for DockerProvisioner {
    async fn create(&self, request: CreateRequest) -> std::result::Result<ProvisionedSandbox, ProvisionError> {
        Ok(self.create_container(request).await?)
    }

    async fn inspect(&self, handle: &SandboxHandle) -> std::result::Result<SandboxStatus, ProvisionError> {
        let status = self
            .cli
            .run(&["inspect", "-f", "{{.State.Status}}", handle.as_str()])
            .await?;
        Ok(SandboxStatus::parse(&status))
    }

    async fn rename(&self, handle: &SandboxHandle, new_name: &str) -> std::result::Result<(), ProvisionError> {
        self.cli.run(&["rename", handle.as_str(), new_name]).await?;
        Ok(())
    }

    async fn stop(&self, handle: &SandboxHandle) -> std::result::Result<(), ProvisionError> {
        self.cli.run(&["stop", handle.as_str()]).await?;
        Ok(())
    }

    async fn remove(&self, handle: &SandboxHandle) -> std::result::Result<(), ProvisionError> {
        self.cli.run(&["rm", "-f", handle.as_str()]).await?;
        Ok(())
    }
}
