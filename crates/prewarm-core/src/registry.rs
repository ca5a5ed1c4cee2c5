//! In-memory table of pooled sandboxes.
//!
//! Every scan-then-mutate sequence runs under one lock. Provisioner calls
//! (the rename during a claim) happen with the lock released; the entry is
//! marked claimed first so no concurrent caller can pick it up meanwhile.

use crate::entry::{EntryId, PoolEntry};
use crate::error::{PoolError, Result};
use crate::provisioner::{SandboxHandle, SandboxProvisioner};
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    /// Insertion order is scan order.
    entries: Vec<PoolEntry>,
    /// Set once the pool is torn down; no inserts or claims afterwards.
    closed: bool,
}

impl Inner {
    fn get_mut(&mut self, id: EntryId) -> Option<&mut PoolEntry> {
        self.entries.iter_mut().find(|e| e.id() == id)
    }
}

/// Registry of pool entries keyed by [`EntryId`].
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a newly created, ready entry.
    ///
    /// # Errors
    ///
    /// [`PoolError::ShuttingDown`] once the registry is closed,
    /// [`PoolError::DuplicateId`] if the id is already present.
    pub async fn insert(&self, entry: PoolEntry) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(PoolError::ShuttingDown);
        }
        if inner.entries.iter().any(|e| e.id() == entry.id()) {
            tracing::error!(entry_id = %entry.id(), "Duplicate pool entry id");
            return Err(PoolError::DuplicateId(entry.id()));
        }
        inner.entries.push(entry);
        Ok(())
    }

    /// Claim the first free entry for `claimant` and rename its sandbox.
    ///
    /// An entry whose rename fails is released again and skipped for the rest
    /// of this call. Returns `None` when nothing could be claimed.
    pub async fn try_reserve_any(
        &self,
        claimant: &str,
        new_name: &str,
        provisioner: &dyn SandboxProvisioner,
    ) -> Option<PoolEntry> {
        let mut skipped: Vec<EntryId> = Vec::new();

        loop {
            let (id, handle) = {
                let mut inner = self.inner.lock().await;
                if inner.closed {
                    return None;
                }
                let entry = inner
                    .entries
                    .iter_mut()
                    .find(|e| e.is_free() && !skipped.contains(&e.id()))?;
                entry.claim(claimant);
                (entry.id(), entry.handle().clone())
            };

            match provisioner.rename(&handle, new_name).await {
                Ok(()) => {
                    let mut inner = self.inner.lock().await;
                    // Gone only if the pool was drained while renaming.
                    let entry = inner.get_mut(id)?;
                    entry.set_name(new_name.to_string());
                    tracing::info!(entry_id = %id, claimant = %claimant, name = %new_name, "Assigned pooled sandbox");
                    return Some(entry.clone());
                }
                Err(e) => {
                    tracing::error!(entry_id = %id, claimant = %claimant, error = %e, "Error renaming pooled sandbox");
                    let mut inner = self.inner.lock().await;
                    if let Some(entry) = inner.get_mut(id) {
                        if entry.claimant() == Some(claimant) {
                            entry.release_claim();
                        }
                    }
                    skipped.push(id);
                }
            }
        }
    }

    /// Put a claimed entry back into the free set.
    ///
    /// Only the claimant holding the entry can release it. Returns whether
    /// the entry was released.
    pub async fn release(&self, id: EntryId, claimant: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.get_mut(id) {
            Some(entry) if entry.claimant() == Some(claimant) => {
                entry.release_claim();
                tracing::debug!(entry_id = %id, claimant = %claimant, "Released pool entry");
                true
            }
            _ => false,
        }
    }

    /// Delete an entry unconditionally.
    pub async fn remove(&self, id: EntryId) -> Option<PoolEntry> {
        let mut inner = self.inner.lock().await;
        let pos = inner.entries.iter().position(|e| e.id() == id)?;
        Some(inner.entries.remove(pos))
    }

    /// Number of free entries.
    pub async fn free_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.is_free())
            .count()
    }

    /// Number of entries in any state.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Copy of every entry, in scan order.
    pub async fn snapshot(&self) -> Vec<PoolEntry> {
        self.inner.lock().await.entries.clone()
    }

    /// Ids and handles of the free entries.
    pub async fn free_handles(&self) -> Vec<(EntryId, SandboxHandle)> {
        self.inner
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.is_free())
            .map(|e| (e.id(), e.handle().clone()))
            .collect()
    }

    /// Take the given entries out of circulation if they are still free.
    ///
    /// Entries claimed since they were inspected are left alone.
    pub async fn retire_free(&self, ids: &[EntryId]) -> Vec<PoolEntry> {
        let mut inner = self.inner.lock().await;
        let mut retired = Vec::with_capacity(ids.len());
        for entry in inner.entries.iter_mut() {
            if ids.contains(&entry.id()) && entry.is_free() {
                entry.retire();
                retired.push(entry.clone());
            }
        }
        retired
    }

    /// Close the registry and take every entry out of it.
    pub async fn drain(&self) -> Vec<PoolEntry> {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        std::mem::take(&mut inner.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::test_entry;
    use crate::error::ProvisionError;
    use crate::testing::MockProvisioner;

    fn renaming_ok() -> MockProvisioner {
        let mut provisioner = MockProvisioner::new();
        provisioner.expect_rename().returning(|_, _| Ok(()));
        provisioner
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let registry = Registry::new();
        let entry = test_entry("a");
        registry.insert(entry.clone()).await.unwrap();

        let err = registry.insert(entry.clone()).await.unwrap_err();
        assert!(matches!(err, PoolError::DuplicateId(id) if id == entry.id()));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_reserve_in_insertion_order() {
        let registry = Registry::new();
        let first = test_entry("a");
        let second = test_entry("b");
        registry.insert(first.clone()).await.unwrap();
        registry.insert(second.clone()).await.unwrap();
        let provisioner = renaming_ok();

        let claimed = registry
            .try_reserve_any("s1", "runtime-s1", &provisioner)
            .await
            .expect("first entry should be claimed");
        assert_eq!(claimed.id(), first.id());
        assert_eq!(claimed.name(), "runtime-s1");
        assert_eq!(claimed.claimant(), Some("s1"));
        assert!(claimed.reserved_at().is_some());
        assert_eq!(registry.free_count().await, 1);

        let claimed = registry
            .try_reserve_any("s2", "runtime-s2", &provisioner)
            .await
            .unwrap();
        assert_eq!(claimed.id(), second.id());

        assert!(registry
            .try_reserve_any("s3", "runtime-s3", &provisioner)
            .await
            .is_none());
        // Claimed entries stay registered.
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_rename_failure_rolls_back_and_continues() {
        let registry = Registry::new();
        let bad = test_entry("bad");
        let good = test_entry("good");
        registry.insert(bad.clone()).await.unwrap();
        registry.insert(good.clone()).await.unwrap();

        let bad_handle = bad.handle().clone();
        let mut provisioner = MockProvisioner::new();
        provisioner.expect_rename().times(2).returning(move |h, _| {
            if *h == bad_handle {
                Err(ProvisionError::Rejected("name conflict".into()))
            } else {
                Ok(())
            }
        });

        let claimed = registry
            .try_reserve_any("s1", "runtime-s1", &provisioner)
            .await
            .unwrap();
        assert_eq!(claimed.id(), good.id());

        let entries = registry.snapshot().await;
        let bad_now = entries.iter().find(|e| e.id() == bad.id()).unwrap();
        assert!(bad_now.is_free());
        assert!(bad_now.reserved_at().is_none());
        assert_eq!(bad_now.name(), "bad");
    }

    #[tokio::test]
    async fn test_all_renames_fail_returns_none() {
        let registry = Registry::new();
        registry.insert(test_entry("a")).await.unwrap();
        registry.insert(test_entry("b")).await.unwrap();
        let mut provisioner = MockProvisioner::new();
        provisioner
            .expect_rename()
            .times(2)
            .returning(|_, _| Err(ProvisionError::Unreachable("daemon down".into())));

        assert!(registry
            .try_reserve_any("s1", "runtime-s1", &provisioner)
            .await
            .is_none());
        assert_eq!(registry.free_count().await, 2);
    }

    #[tokio::test]
    async fn test_retire_skips_claimed_entries() {
        let registry = Registry::new();
        let a = test_entry("a");
        let b = test_entry("b");
        registry.insert(a.clone()).await.unwrap();
        registry.insert(b.clone()).await.unwrap();
        registry
            .try_reserve_any("s1", "runtime-s1", &renaming_ok())
            .await
            .unwrap();

        let retired = registry.retire_free(&[a.id(), b.id()]).await;
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].id(), b.id());
        assert_eq!(registry.free_count().await, 0);
        assert!(registry.free_handles().await.is_empty());
    }

    #[tokio::test]
    async fn test_drain_closes_registry() {
        let registry = Registry::new();
        registry.insert(test_entry("a")).await.unwrap();

        let drained = registry.drain().await;
        assert_eq!(drained.len(), 1);
        assert_eq!(registry.len().await, 0);

        let err = registry.insert(test_entry("b")).await.unwrap_err();
        assert!(matches!(err, PoolError::ShuttingDown));
        assert!(registry
            .try_reserve_any("s1", "runtime-s1", &MockProvisioner::new())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_release_only_by_claimant() {
        let registry = Registry::new();
        let entry = test_entry("a");
        registry.insert(entry.clone()).await.unwrap();
        registry
            .try_reserve_any("s1", "runtime-s1", &renaming_ok())
            .await
            .unwrap();

        assert!(!registry.release(entry.id(), "s2").await);
        assert_eq!(registry.free_count().await, 0);

        assert!(registry.release(entry.id(), "s1").await);
        assert_eq!(registry.free_count().await, 1);
        let released = &registry.snapshot().await[0];
        assert!(released.claimant().is_none());
        assert!(released.reserved_at().is_none());

        // Already free.
        assert!(!registry.release(entry.id(), "s1").await);
        let claimed = registry
            .try_reserve_any("s3", "runtime-s3", &renaming_ok())
            .await
            .unwrap();
        assert_eq!(claimed.name(), "runtime-s3");
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = Registry::new();
        let entry = test_entry("a");
        registry.insert(entry.clone()).await.unwrap();
        assert!(registry.remove(entry.id()).await.is_some());
        assert!(registry.remove(entry.id()).await.is_none());
    }
}
