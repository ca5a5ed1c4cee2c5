//! Scripted in-memory provisioner for pool integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use prewarm_core::{
    CreateRequest, DynProvisioner, LivenessCheck, PoolConfig, ProbeConfig, ProbeFailure,
    ProvisionError, ProvisionedSandbox, ReadinessProber, SandboxHandle, SandboxPool,
    SandboxProvisioner, SandboxStatus,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeSandbox {
    pub name: String,
    pub status: SandboxStatus,
    pub request: CreateRequest,
}

#[derive(Default)]
struct State {
    sandboxes: BTreeMap<String, FakeSandbox>,
    create_calls: usize,
    /// 1-based create call numbers that fail.
    failing_creates: HashSet<usize>,
    fail_all_creates: bool,
    /// Newly created sandboxes report this status (default running).
    created_status: Option<SandboxStatus>,
    failing_renames: HashSet<String>,
    /// Status queries for these handles cannot reach the runtime.
    failing_inspects: HashSet<String>,
    /// Stop and remove fail for every sandbox.
    fail_destroy: bool,
    removed: Vec<String>,
}

/// Provisioner backed by a map of fake sandboxes.
#[derive(Default)]
pub struct FakeProvisioner {
    state: Mutex<State>,
    rename_delay: Option<Duration>,
}

impl FakeProvisioner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rename sleeps before answering, widening the claim window.
    pub fn with_rename_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            rename_delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn fail_create_call(&self, n: usize) {
        self.state.lock().unwrap().failing_creates.insert(n);
    }

    pub fn fail_all_creates(&self, fail: bool) {
        self.state.lock().unwrap().fail_all_creates = fail;
    }

    pub fn create_as(&self, status: SandboxStatus) {
        self.state.lock().unwrap().created_status = Some(status);
    }

    pub fn fail_rename(&self, handle: &SandboxHandle) {
        self.state
            .lock()
            .unwrap()
            .failing_renames
            .insert(handle.as_str().to_string());
    }

    pub fn fail_inspect(&self, handle: &SandboxHandle) {
        self.state
            .lock()
            .unwrap()
            .failing_inspects
            .insert(handle.as_str().to_string());
    }

    pub fn fail_destroy(&self, fail: bool) {
        self.state.lock().unwrap().fail_destroy = fail;
    }

    pub fn set_status(&self, handle: &SandboxHandle, status: SandboxStatus) {
        if let Some(sandbox) = self.state.lock().unwrap().sandboxes.get_mut(handle.as_str()) {
            sandbox.status = status;
        }
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().unwrap().sandboxes.len()
    }

    pub fn contains(&self, handle: &SandboxHandle) -> bool {
        self.state
            .lock()
            .unwrap()
            .sandboxes
            .contains_key(handle.as_str())
    }

    pub fn name_of(&self, handle: &SandboxHandle) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .sandboxes
            .get(handle.as_str())
            .map(|s| s.name.clone())
    }

    pub fn sandboxes(&self) -> Vec<FakeSandbox> {
        self.state.lock().unwrap().sandboxes.values().cloned().collect()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }
}

#[async_trait]
impl SandboxProvisioner for FakeProvisioner {
    async fn create(&self, request: CreateRequest) -> Result<ProvisionedSandbox, ProvisionError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        let n = state.create_calls;
        if state.fail_all_creates || state.failing_creates.contains(&n) {
            return Err(ProvisionError::Rejected(format!("create #{n} refused")));
        }

        let handle = format!("c{n}");
        let status = state.created_status.unwrap_or(SandboxStatus::Running);
        state.sandboxes.insert(
            handle.clone(),
            FakeSandbox {
                name: request.name.clone(),
                status,
                request,
            },
        );
        let n = n as u16;
        Ok(ProvisionedSandbox {
            handle: SandboxHandle::new(handle),
            control_port: 30000 + n,
            ide_port: 40000 + n,
            app_ports: vec![50000 + n, 55000 + n],
        })
    }

    async fn inspect(&self, handle: &SandboxHandle) -> Result<SandboxStatus, ProvisionError> {
        let state = self.state.lock().unwrap();
        if state.failing_inspects.contains(handle.as_str()) {
            return Err(ProvisionError::Unreachable("runtime not responding".into()));
        }
        state
            .sandboxes
            .get(handle.as_str())
            .map(|s| s.status)
            .ok_or_else(|| ProvisionError::Rejected(format!("no such container: {handle}")))
    }

    async fn rename(&self, handle: &SandboxHandle, new_name: &str) -> Result<(), ProvisionError> {
        if let Some(delay) = self.rename_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.failing_renames.contains(handle.as_str()) {
            return Err(ProvisionError::Rejected(format!("cannot rename {handle}")));
        }
        match state.sandboxes.get_mut(handle.as_str()) {
            Some(sandbox) => {
                sandbox.name = new_name.to_string();
                Ok(())
            }
            None => Err(ProvisionError::Rejected(format!("no such container: {handle}"))),
        }
    }

    async fn stop(&self, handle: &SandboxHandle) -> Result<(), ProvisionError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_destroy {
            return Err(ProvisionError::Unreachable(format!("cannot stop {handle}")));
        }
        if let Some(sandbox) = state.sandboxes.get_mut(handle.as_str()) {
            sandbox.status = SandboxStatus::Exited;
        }
        Ok(())
    }

    async fn remove(&self, handle: &SandboxHandle) -> Result<(), ProvisionError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_destroy {
            return Err(ProvisionError::Unreachable(format!("cannot remove {handle}")));
        }
        match state.sandboxes.remove(handle.as_str()) {
            Some(_) => {
                state.removed.push(handle.as_str().to_string());
                Ok(())
            }
            None => Err(ProvisionError::Rejected(format!("no such container: {handle}"))),
        }
    }
}

/// Liveness check that always succeeds.
pub struct AlwaysAlive;

#[async_trait]
impl LivenessCheck for AlwaysAlive {
    async fn check(&self, _port: u16) -> Result<(), ProbeFailure> {
        Ok(())
    }
}

/// Liveness check that never succeeds.
pub struct NeverAlive;

#[async_trait]
impl LivenessCheck for NeverAlive {
    async fn check(&self, _port: u16) -> Result<(), ProbeFailure> {
        Err(ProbeFailure::Connect("connection refused".into()))
    }
}

pub fn config(target_size: usize) -> PoolConfig {
    PoolConfig::builder()
        .target_size(target_size)
        .max_batch(3)
        .build()
        .unwrap()
}

pub fn pool_with_check(
    config: PoolConfig,
    provisioner: &Arc<FakeProvisioner>,
    check: Arc<dyn LivenessCheck>,
) -> SandboxPool {
    let provisioner: DynProvisioner = provisioner.clone();
    let prober = ReadinessProber::with_check(check, &ProbeConfig::default());
    SandboxPool::with_prober(config, provisioner, prober)
}

pub fn pool(config: PoolConfig, provisioner: &Arc<FakeProvisioner>) -> SandboxPool {
    pool_with_check(config, provisioner, Arc::new(AlwaysAlive))
}
