//! # prewarm-core
//!
//! Pre-warmed pool of isolated execution sandboxes.
//!
//! Creating a sandbox is slow: the image has to be prepared, the container
//! booted, plugins injected and the control server polled until it answers.
//! This crate keeps a target number of sandboxes ready ahead of demand so a
//! caller can claim one instantly.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      SandboxPool                         │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  get_sandbox() ───▶ Registry (one lock) ◀── maintenance  │
//! │                       │    ▲                 (interval)  │
//! │                       │    │ insert            │         │
//! │                       │  FillController ◀──────┘         │
//! │                       │    │ create + probe              │
//! │                       ▼    ▼                             │
//! │               dyn SandboxProvisioner   ReadinessProber   │
//! └──────────────────────────────────────────────────────────┘
//!                         │                    │ GET /alive
//!                         ▼                    ▼
//!                 container runtime      sandbox control port
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use prewarm_core::{PoolConfig, SandboxPool};
//! use std::sync::Arc;
//!
//! # async fn example(provisioner: prewarm_core::DynProvisioner) -> Result<(), prewarm_core::ConfigError> {
//! let config = PoolConfig::builder().target_size(2).max_batch(2).build()?;
//! let pool = Arc::new(SandboxPool::new(config, provisioner));
//! pool.start().await;
//!
//! if let Some(entry) = pool.get_sandbox("session-1").await {
//!     println!("{} on port {}", entry.name(), entry.ports().control);
//! }
//!
//! pool.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Reservation**: lock-protected claim of the first free sandbox, with
//!   rollback when the rename fails
//! - **Bounded fill**: at most `max_batch` creations per pass, stopping at
//!   the first failure
//! - **Failure backoff**: fill passes are skipped for a while after a pass
//!   that created nothing
//! - **Readiness probing**: deadline-bounded liveness polling that gives up
//!   early on exited sandboxes
//! - **Self-healing**: periodic eviction of free sandboxes that stopped running

mod config;
mod entry;
mod error;
mod fill;
mod pool;
mod probe;
mod provisioner;
mod registry;
#[cfg(test)]
mod testing;

pub use config::{PoolConfig, PoolConfigBuilder, ProbeConfig};
pub use entry::{EndpointPorts, EntryId, EntryState, PoolEntry};
pub use error::{ConfigError, PoolError, ProvisionError, Result};
pub use fill::FillOutcome;
pub use pool::{MaintenanceReport, PoolStats, SandboxPool};
pub use probe::{HttpLivenessCheck, LivenessCheck, ProbeFailure, ReadinessProber};
pub use provisioner::{
    destroy, CreateRequest, DynProvisioner, PluginRequirement, PortRequirements,
    ProvisionedSandbox, SandboxHandle, SandboxProvisioner, SandboxStatus, VolumeBinding,
};
