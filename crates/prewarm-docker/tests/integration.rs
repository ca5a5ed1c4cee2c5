//! Integration tests for prewarm-docker.
//!
//! These tests require:
//! - A running Docker daemon
//! - A runtime image whose control server answers `GET /alive`
//!
//! Run with: `PREWARM_TEST_IMAGE=<image> cargo test -p prewarm-docker -- --ignored`

use prewarm_core::{
    CreateRequest, PluginRequirement, PoolConfig, ProvisionError, SandboxPool,
    SandboxProvisioner, SandboxStatus,
};
use prewarm_docker::{DockerConfig, DockerProvisioner};
use std::sync::Arc;

fn test_image() -> Option<String> {
    match std::env::var("PREWARM_TEST_IMAGE") {
        Ok(image) => Some(image),
        Err(_) => {
            eprintln!("Skipping test: set PREWARM_TEST_IMAGE to a runtime image");
            None
        }
    }
}

/// create -> inspect -> rename -> stop -> remove
#[tokio::test]
#[ignore = "requires docker"]
async fn test_container_lifecycle() {
    let Some(image) = test_image() else { return };
    let provisioner = DockerProvisioner::new(DockerConfig::with_image(image)).unwrap();

    let name = format!("prewarm-test-{}", uuid::Uuid::new_v4());
    let sandbox = provisioner
        .create(CreateRequest::generic(name, vec![PluginRequirement::new("jupyter")]))
        .await
        .expect("Failed to create container");
    assert!((30000..=39999).contains(&sandbox.control_port));

    let status = provisioner.inspect(&sandbox.handle).await.unwrap();
    assert_ne!(status, SandboxStatus::Exited);

    let renamed = format!("prewarm-test-claimed-{}", uuid::Uuid::new_v4());
    provisioner.rename(&sandbox.handle, &renamed).await.unwrap();

    prewarm_core::destroy(&provisioner, &sandbox.handle)
        .await
        .expect("Failed to destroy container");
    assert!(provisioner.inspect(&sandbox.handle).await.is_err());
}

/// Full pool against the real daemon.
#[tokio::test]
#[ignore = "requires docker"]
async fn test_pool_with_docker() {
    let Some(image) = test_image() else { return };
    let provisioner = DockerProvisioner::new(DockerConfig::with_image(image)).unwrap();
    let config = PoolConfig::builder().target_size(1).build().unwrap();
    let pool = SandboxPool::new(config, Arc::new(provisioner));

    pool.start().await;
    let entry = pool.get_sandbox("integration").await.expect("pool should serve a sandbox");
    assert_eq!(entry.name(), "sandbox-runtime-integration");
    pool.stop().await;
    assert_eq!(pool.size().await, 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_inspect_unknown_container_is_rejected() {
    let provisioner = DockerProvisioner::new(DockerConfig::default()).unwrap();
    let err = provisioner
        .inspect(&prewarm_core::SandboxHandle::new("prewarm-does-not-exist"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Rejected(_)));
}

#[tokio::test]
async fn test_create_without_image_never_calls_docker() {
    let config = DockerConfig {
        docker_path: "/nonexistent/docker".into(),
        ..Default::default()
    };
    let provisioner = DockerProvisioner::new(config).unwrap();
    let err = provisioner
        .create(CreateRequest::generic("x", vec![]))
        .await
        .unwrap_err();
    // Rejected, not Unreachable: the binary was never run.
    assert!(matches!(err, ProvisionError::Rejected(_)));
}
