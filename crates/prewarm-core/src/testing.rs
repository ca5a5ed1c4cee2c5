//! Test doubles shared by the unit tests.

use crate::error::ProvisionError;
use crate::provisioner::{
    CreateRequest, ProvisionedSandbox, SandboxHandle, SandboxProvisioner, SandboxStatus,
};
use async_trait::async_trait;
use mockall::mock;

mock! {
    pub Provisioner {}
    #[async_trait]
    impl SandboxProvisioner for Provisioner {
        async fn create(&self, request: CreateRequest) -> Result<ProvisionedSandbox, ProvisionError>;
        async fn inspect(&self, handle: &SandboxHandle) -> Result<SandboxStatus, ProvisionError>;
        async fn rename(&self, handle: &SandboxHandle, new_name: &str) -> Result<(), ProvisionError>;
        async fn stop(&self, handle: &SandboxHandle) -> Result<(), ProvisionError>;
        async fn remove(&self, handle: &SandboxHandle) -> Result<(), ProvisionError>;
    }
}

/// A provisioned sandbox with predictable ports.
pub fn provisioned(handle: &str) -> ProvisionedSandbox {
    ProvisionedSandbox {
        handle: SandboxHandle::new(handle),
        control_port: 30000,
        ide_port: 40000,
        app_ports: vec![50000, 55000],
    }
}
