//! Warm sandbox pool for reducing cold-start latency.
//!
//! This module keeps a target number of pre-started, ready sandboxes so a
//! caller asking for one gets it without paying for image setup, boot and
//! readiness polling.
//!
//! # Architecture
//!
//! The pool keeps a registry of entries and a background maintenance task
//! that, on every interval, evicts free entries whose sandbox is no longer
//! running and then tops the pool back up to its target size.
//!
//! # Example
//!
//! ```ignore
//! use prewarm_core::{PoolConfig, SandboxPool};
//!
//! let config = PoolConfig::builder().target_size(3).build()?;
//! let pool = SandboxPool::new(config, provisioner);
//! pool.start().await; // maintenance + initial fill
//!
//! // Claim a warm sandbox, or fall back to provisioning one directly
//! match pool.get_sandbox("session-42").await {
//!     Some(entry) => println!("control port {}", entry.ports().control),
//!     None => { /* cold start */ }
//! }
//!
//! pool.stop().await;
//! ```

use crate::config::PoolConfig;
use crate::entry::{EntryId, PoolEntry};
use crate::error::Result;
use crate::fill::{EntryFactory, FillController, FillOutcome};
use crate::probe::ReadinessProber;
use crate::provisioner::{self, CreateRequest, DynProvisioner, SandboxHandle, SandboxStatus};
use crate::registry::Registry;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;

// ============================================================================
// Statistics
// ============================================================================

/// Pool statistics for observability.
///
/// All counters are atomic and can be read without locking.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Reservations served from the pool.
    pub claims: AtomicU64,
    /// Reservations that found no free sandbox.
    pub misses: AtomicU64,
    /// Sandboxes created and registered by the pool.
    pub created: AtomicU64,
    /// Single creations that failed (provisioning, readiness or insert).
    pub creation_failures: AtomicU64,
    /// Free entries evicted by maintenance.
    pub evicted: AtomicU64,
    /// Sandboxes the pool tore down (evictions, failed creations, shutdown).
    pub destroyed: AtomicU64,
    /// Fill passes skipped by the failure backoff.
    pub deferred_fills: AtomicU64,
}

impl PoolStats {
    /// Get the number of reservations served.
    pub fn claims(&self) -> u64 {
        self.claims.load(Ordering::Relaxed)
    }

    /// Get the number of reservation misses.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get the total sandboxes created.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Get the number of failed creations.
    pub fn creation_failures(&self) -> u64 {
        self.creation_failures.load(Ordering::Relaxed)
    }

    /// Get the number of evicted entries.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Get the total sandboxes destroyed.
    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }

    /// Get the number of deferred fill passes.
    pub fn deferred_fills(&self) -> u64 {
        self.deferred_fills.load(Ordering::Relaxed)
    }

    /// Calculate the claim hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.claims() as f64;
        let misses = self.misses() as f64;
        let total = hits + misses;
        if total == 0.0 {
            0.0
        } else {
            (hits / total) * 100.0
        }
    }
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Free entries evicted because their sandbox was not running.
    pub evicted: usize,
    /// Outcome of the fill pass that followed eviction.
    pub fill: FillOutcome,
}

// ============================================================================
// Pool Implementation
// ============================================================================

enum Lifecycle {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

struct PoolInner {
    config: PoolConfig,
    provisioner: DynProvisioner,
    prober: ReadinessProber,
    registry: Registry,
    fill: FillController,
    /// Set first thing in `stop()`.
    shutdown: AtomicBool,
    /// Wakes the maintenance task out of its sleep.
    shutdown_notify: Notify,
    stats: PoolStats,
}

/// A pool of pre-started sandboxes for instant reservation.
///
/// All operations take `&self`; share the pool between tasks with `Arc`.
/// The owner is responsible for calling [`start`](Self::start) once and
/// [`stop`](Self::stop) before the process exits.
pub struct SandboxPool {
    inner: Arc<PoolInner>,
    lifecycle: Mutex<Lifecycle>,
}

impl SandboxPool {
    /// Create a pool that probes readiness over HTTP.
    ///
    /// Nothing is created until [`start()`](Self::start) is called. The
    /// configuration is expected to be validated (see
    /// [`PoolConfig::builder`]).
    pub fn new(config: PoolConfig, provisioner: DynProvisioner) -> Self {
        let prober = ReadinessProber::http(&config.probe);
        Self::with_prober(config, provisioner, prober)
    }

    /// Create a pool with a custom readiness prober.
    pub fn with_prober(
        config: PoolConfig,
        provisioner: DynProvisioner,
        prober: ReadinessProber,
    ) -> Self {
        tracing::info!(
            target_size = config.target_size,
            max_batch = config.max_batch,
            plugins = config.plugins.len(),
            "Creating sandbox pool"
        );

        Self {
            inner: Arc::new(PoolInner {
                fill: FillController::new(config.max_batch, config.failure_backoff),
                config,
                provisioner,
                prober,
                registry: Registry::new(),
                shutdown: AtomicBool::new(false),
                shutdown_notify: Notify::new(),
                stats: PoolStats::default(),
            }),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Start background maintenance and perform the initial fill.
    ///
    /// Returns once the first fill pass is over. That pass is best-effort:
    /// creations can fail, so the pool may hold fewer than `target_size`
    /// sandboxes afterwards. No-op when pooling is disabled, already running
    /// or stopped.
    pub async fn start(&self) {
        if !self.inner.config.is_enabled() {
            tracing::info!("Sandbox pool disabled (target_size=0)");
            return;
        }

        {
            let mut lifecycle = self.lifecycle.lock().await;
            match *lifecycle {
                Lifecycle::Running(_) => {
                    tracing::warn!("Sandbox pool already started");
                    return;
                }
                Lifecycle::Stopped => {
                    tracing::warn!("Sandbox pool was stopped and cannot be restarted");
                    return;
                }
                Lifecycle::Idle => {}
            }
            let inner = Arc::clone(&self.inner);
            *lifecycle = Lifecycle::Running(tokio::spawn(maintenance_loop(inner)));
        }

        tracing::info!(
            target_size = self.inner.config.target_size,
            interval_secs = self.inner.config.maintenance_interval.as_secs(),
            "Sandbox pool started"
        );

        let outcome = self.inner.fill_pool().await;
        tracing::info!(?outcome, "Initial pool fill complete");
    }

    /// Gracefully stop the pool.
    ///
    /// This:
    /// 1. Raises the shutdown flag so no new claims or creations start
    /// 2. Wakes the maintenance task and waits for it to exit
    /// 3. Destroys every sandbox still in the registry
    ///
    /// Destroy failures are logged, never returned. Calling `stop()` again is
    /// a no-op.
    pub async fn stop(&self) {
        let handle = {
            let mut lifecycle = self.lifecycle.lock().await;
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Stopped => {
                    tracing::debug!("Sandbox pool already stopped");
                    return;
                }
                Lifecycle::Idle => None,
                Lifecycle::Running(handle) => Some(handle),
            }
        };

        tracing::info!("Shutting down sandbox pool");
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.shutdown_notify.notify_one();

        if let Some(handle) = handle {
            tracing::debug!("Waiting for maintenance task to complete");
            if let Err(e) = handle.await {
                tracing::error!(error = ?e, "Maintenance task panicked during shutdown");
            }
        }

        let entries = self.inner.registry.drain().await;
        let count = entries.len();
        tracing::info!(count, "Destroying pooled sandboxes");

        for entry in entries {
            self.inner.discard(entry.handle(), entry.name()).await;
        }

        let stats = &self.inner.stats;
        tracing::info!(
            destroyed = count,
            claims = stats.claims(),
            misses = stats.misses(),
            hit_rate = format!("{:.1}%", stats.hit_rate()),
            "Pool shutdown complete"
        );
    }

    /// Reserve a free sandbox for `claimant`.
    ///
    /// The sandbox is renamed to `<claim_prefix><claimant>` and from then on
    /// belongs to the caller; the pool never touches it again except when
    /// the pool itself is stopped. `None` means no sandbox is available
    /// right now (pool empty, disabled or stopping), and the caller should
    /// provision one directly.
    ///
    /// Dropping the returned future before it completes leaves the pool as
    /// it was: an entry reserved on the caller's behalf is released again.
    pub async fn get_sandbox(&self, claimant: &str) -> Option<PoolEntry> {
        let inner = &self.inner;
        if !inner.config.is_enabled() {
            return None;
        }
        if inner.is_shutting_down() {
            tracing::debug!(claimant = %claimant, "Pool is shutting down, no sandbox");
            return None;
        }

        // The reservation runs in its own task so it always finishes, and
        // its result is handed back through the guard.
        let (tx, rx) = oneshot::channel();
        let task_inner = Arc::clone(inner);
        let task_claimant = claimant.to_string();
        tokio::spawn(async move {
            let new_name = format!("{}{}", task_inner.config.claim_prefix, task_claimant);
            let reserved = task_inner
                .registry
                .try_reserve_any(&task_claimant, &new_name, task_inner.provisioner.as_ref())
                .await;
            if let Err(Some(entry)) = tx.send(reserved) {
                tracing::debug!(entry_id = %entry.id(), claimant = %task_claimant, "Claim abandoned by caller");
                task_inner.registry.release(entry.id(), &task_claimant).await;
            }
        });

        let mut pending = PendingClaim {
            rx,
            inner: Arc::clone(inner),
            claimant: claimant.to_string(),
        };
        // A panicked reservation task counts as a miss.
        let reserved = (&mut pending.rx).await.ok().flatten();

        match reserved {
            Some(entry) => {
                inner.stats.claims.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                inner.stats.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(claimant = %claimant, "No available sandboxes in pool");
                None
            }
        }
    }

    /// Run one fill pass now.
    pub async fn fill_pool(&self) -> FillOutcome {
        self.inner.fill_pool().await
    }

    /// Run one maintenance pass (eviction, then fill) now.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        self.inner.run_maintenance().await
    }

    /// Number of entries in the registry, claimed ones included.
    pub async fn size(&self) -> usize {
        self.inner.registry.len().await
    }

    /// Number of free entries.
    pub async fn free_count(&self) -> usize {
        self.inner.registry.free_count().await
    }

    /// Snapshot of every entry.
    pub async fn entries(&self) -> Vec<PoolEntry> {
        self.inner.registry.snapshot().await
    }

    /// Time left in the failure backoff window, if armed.
    pub async fn backoff_remaining(&self) -> Option<Duration> {
        self.inner.fill.backoff_remaining().await
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the pool statistics.
    pub fn stats(&self) -> &PoolStats {
        &self.inner.stats
    }

    /// Check if the maintenance task is running.
    pub async fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock().await, Lifecycle::Running(_))
            && !self.inner.is_shutting_down()
    }
}

/// Receiving end of a reservation running in its own task.
///
/// If the caller goes away first, a reservation that already completed is
/// released back into the pool.
struct PendingClaim {
    rx: oneshot::Receiver<Option<PoolEntry>>,
    inner: Arc<PoolInner>,
    claimant: String,
}

impl Drop for PendingClaim {
    fn drop(&mut self) {
        // After close() the task's send fails and the task releases itself;
        // only a result sent before that is left here.
        self.rx.close();
        let Ok(Some(entry)) = self.rx.try_recv() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(entry_id = %entry.id(), claimant = %self.claimant, "No runtime to release abandoned claim");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let claimant = std::mem::take(&mut self.claimant);
        runtime.spawn(async move {
            tracing::debug!(entry_id = %entry.id(), claimant = %claimant, "Claim abandoned by caller");
            inner.registry.release(entry.id(), &claimant).await;
        });
    }
}

impl PoolInner {
    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    async fn fill_pool(&self) -> FillOutcome {
        let outcome = self
            .fill
            .fill(self.config.target_size, &self.registry, self)
            .await;
        if let FillOutcome::Deferred { .. } = outcome {
            self.stats.deferred_fills.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    async fn run_maintenance(&self) -> MaintenanceReport {
        let evicted = self.evict_unhealthy().await;
        let fill = self.fill_pool().await;
        MaintenanceReport { evicted, fill }
    }

    /// Destroy and remove free entries whose sandbox is not running.
    async fn evict_unhealthy(&self) -> usize {
        let mut unhealthy: Vec<EntryId> = Vec::new();
        for (id, handle) in self.registry.free_handles().await {
            match self.provisioner.inspect(&handle).await {
                Ok(SandboxStatus::Running) => {}
                Ok(status) => {
                    tracing::debug!(entry_id = %id, %status, "Removing non-running pooled sandbox");
                    unhealthy.push(id);
                }
                Err(e) => {
                    tracing::debug!(entry_id = %id, error = %e, "Removing unreachable pooled sandbox");
                    unhealthy.push(id);
                }
            }
        }
        if unhealthy.is_empty() {
            return 0;
        }

        let retired = self.registry.retire_free(&unhealthy).await;
        for entry in &retired {
            self.discard(entry.handle(), entry.name()).await;
            self.registry.remove(entry.id()).await;
            self.stats.evicted.fetch_add(1, Ordering::Relaxed);
        }
        tracing::info!(evicted = retired.len(), "Evicted unhealthy pooled sandboxes");
        retired.len()
    }

    /// Best-effort stop + remove.
    async fn discard(&self, handle: &SandboxHandle, name: &str) {
        match provisioner::destroy(self.provisioner.as_ref(), handle).await {
            Ok(()) => {
                self.stats.destroyed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(sandbox = %name, "Pooled sandbox destroyed");
            }
            Err(e) => {
                tracing::warn!(sandbox = %name, error = %e, "Error removing pooled sandbox");
            }
        }
    }

    async fn try_create_entry(&self) -> Result<EntryId> {
        let start = tokio::time::Instant::now();
        let id = EntryId::new();
        let name = format!("{}{}", self.config.pool_prefix, id);
        tracing::debug!(entry_id = %id, sandbox = %name, "Creating pooled sandbox");

        let request = CreateRequest::generic(name.clone(), self.config.plugins.clone());
        let sandbox = self.provisioner.create(request).await?;
        let handle = sandbox.handle.clone();

        if let Err(e) = self
            .prober
            .wait_ready(self.provisioner.as_ref(), &handle, &name, sandbox.control_port)
            .await
        {
            self.discard(&handle, &name).await;
            return Err(e);
        }

        let entry = PoolEntry::new(id, name.clone(), sandbox);
        if let Err(e) = self.registry.insert(entry).await {
            tracing::debug!(entry_id = %id, error = %e, "Discarding sandbox that could not be registered");
            self.discard(&handle, &name).await;
            return Err(e);
        }

        tracing::info!(
            entry_id = %id,
            sandbox = %name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Created pooled sandbox"
        );
        Ok(id)
    }
}

#[async_trait]
impl EntryFactory for PoolInner {
    async fn create_entry(&self) -> Result<EntryId> {
        match self.try_create_entry().await {
            Ok(id) => {
                self.stats.created.fetch_add(1, Ordering::Relaxed);
                Ok(id)
            }
            Err(e) => {
                self.stats.creation_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn is_shutting_down(&self) -> bool {
        PoolInner::is_shutting_down(self)
    }
}

/// Background maintenance loop.
///
/// Runs until shutdown is signaled. A panicking pass is logged and the loop
/// carries on with the next interval.
async fn maintenance_loop(inner: Arc<PoolInner>) {
    tracing::debug!("Maintenance loop started");

    loop {
        tokio::select! {
            biased;

            _ = inner.shutdown_notify.notified() => {
                tracing::info!("Maintenance loop received shutdown signal");
                break;
            }

            _ = tokio::time::sleep(inner.config.maintenance_interval) => {
                if inner.is_shutting_down() {
                    tracing::debug!("Maintenance detected shutdown flag");
                    break;
                }

                let pass_inner = Arc::clone(&inner);
                match tokio::spawn(async move { pass_inner.run_maintenance().await }).await {
                    Ok(report) => {
                        tracing::debug!(evicted = report.evicted, fill = ?report.fill, "Maintenance pass complete");
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "Error in pool maintenance pass");
                    }
                }
            }
        }
    }

    tracing::debug!("Maintenance loop exited");
}

// ============================================================================
// Tests
// ============================================================================
