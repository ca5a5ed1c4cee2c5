//! Fill controller: closes the gap between target size and free entries.
//!
//! Creations run one at a time and the first failure ends the pass. A pass
//! that creates nothing arms a backoff window during which later passes are
//! skipped; any success disarms it.

use crate::entry::EntryId;
use crate::error::Result;
use crate::registry::Registry;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Creates one ready entry and inserts it into the registry.
#[async_trait]
pub(crate) trait EntryFactory: Send + Sync {
    async fn create_entry(&self) -> Result<EntryId>;

    fn is_shutting_down(&self) -> bool;
}

/// Result of one fill pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// Pooling is disabled (target size zero).
    Disabled,
    /// The pool is shutting down; nothing was attempted.
    ShuttingDown,
    /// Skipped because a recent pass failed entirely.
    Deferred {
        /// Time left in the backoff window.
        remaining: Duration,
    },
    /// Enough free entries already.
    Satisfied,
    /// Creations were attempted.
    Filled {
        /// Creations attempted (never more than `max_batch`).
        attempted: usize,
        /// Creations that produced a ready entry.
        created: usize,
    },
}

pub(crate) struct FillController {
    max_batch: usize,
    backoff: Duration,
    last_failure: Mutex<Option<Instant>>,
    /// Serializes passes so concurrent callers cannot overfill.
    pass: Mutex<()>,
}

impl FillController {
    pub fn new(max_batch: usize, backoff: Duration) -> Self {
        Self {
            max_batch,
            backoff,
            last_failure: Mutex::new(None),
            pass: Mutex::new(()),
        }
    }

    /// Time left in the backoff window, if it is armed.
    pub async fn backoff_remaining(&self) -> Option<Duration> {
        let last_failure = (*self.last_failure.lock().await)?;
        let remaining = self.backoff.checked_sub(last_failure.elapsed())?;
        (!remaining.is_zero()).then_some(remaining)
    }

    pub async fn fill(
        &self,
        target_size: usize,
        registry: &Registry,
        factory: &dyn EntryFactory,
    ) -> FillOutcome {
        if target_size == 0 {
            return FillOutcome::Disabled;
        }

        let _pass = self.pass.lock().await;
        if factory.is_shutting_down() {
            return FillOutcome::ShuttingDown;
        }

        if let Some(remaining) = self.backoff_remaining().await {
            tracing::debug!(
                remaining_secs = remaining.as_secs(),
                "Skipping pool fill due to recent failures (backoff period)"
            );
            return FillOutcome::Deferred { remaining };
        }

        let free = registry.free_count().await;
        let needed = target_size.saturating_sub(free);
        if needed == 0 {
            return FillOutcome::Satisfied;
        }

        let batch = needed.min(self.max_batch);
        tracing::info!(batch, needed, free, target = target_size, "Creating sandboxes for pool");

        let mut attempted = 0;
        let mut created = 0;
        for i in 0..batch {
            if factory.is_shutting_down() {
                tracing::debug!("Shutdown requested, ending fill pass");
                break;
            }
            attempted += 1;
            match factory.create_entry().await {
                Ok(id) => {
                    created += 1;
                    tracing::debug!(entry_id = %id, attempt = i + 1, batch, "Pooled sandbox created");
                }
                Err(e) => {
                    tracing::warn!(attempt = i + 1, batch, error = %e, "Failed to create pooled sandbox");
                    break;
                }
            }
        }

        let mut last_failure = self.last_failure.lock().await;
        if created > 0 {
            tracing::info!(created, attempted, "Pool fill pass complete");
            *last_failure = None;
        } else if attempted > 0 && !factory.is_shutting_down() {
            tracing::warn!(
                backoff_secs = self.backoff.as_secs(),
                "Failed to create any pooled sandboxes, backing off"
            );
            *last_failure = Some(Instant::now());
        }

        FillOutcome::Filled { attempted, created }
    }
}
