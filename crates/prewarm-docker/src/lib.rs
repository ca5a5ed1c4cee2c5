//! # prewarm-docker
//!
//! Docker provisioner for the prewarm sandbox pool.
//! Drives the `docker` CLI to create, inspect, rename and remove containers.
//!
//! ## Quick Start
//!
//! ```no_run
//! use prewarm_core::{PoolConfig, SandboxPool};
//! use prewarm_docker::{DockerConfig, DockerProvisioner};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provisioner = DockerProvisioner::new(DockerConfig::with_image("runtime:latest"))?;
//! let config = PoolConfig::builder().target_size(2).build()?;
//! let pool = SandboxPool::new(config, Arc::new(provisioner));
//! pool.start().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Port Allocation**: control, IDE and two app ports from fixed ranges,
//!   checked with a local bind
//! - **Networking**: ports published on a configurable address, or host networking
//! - **Failure Classification**: daemon/binary problems map to
//!   `ProvisionError::Unreachable`, everything else to `Rejected`

mod cli;
mod config;
mod error;
mod ports;
mod provisioner;

pub use cli::DockerCli;
pub use config::DockerConfig;
pub use error::{DockerError, Result};
pub use ports::{
    find_available_port, is_port_free, PortRange, APP_PORTS_1, APP_PORTS_2, CONTROL_PORTS,
    IDE_PORTS,
};
pub use provisioner::{AssignedPorts, DockerProvisioner};
