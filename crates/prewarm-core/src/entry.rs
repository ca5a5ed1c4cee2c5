//! Pool entry type - one pre-started sandbox and its claim state.

use crate::provisioner::{ProvisionedSandbox, SandboxHandle};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new random entry ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Host ports assigned to a pooled sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointPorts {
    /// Control server port, probed for readiness.
    pub control: u16,
    /// IDE server port.
    pub ide: u16,
    /// Application ports.
    pub app: Vec<u16>,
}

/// Claim state of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum EntryState {
    /// Ready and eligible for reservation.
    Free,
    /// Assigned to a claimant; the pool no longer manages it.
    Claimed {
        /// Identity the entry was claimed for.
        claimant: String,
        /// When the claim was made.
        at: DateTime<Utc>,
    },
    /// Taken out of circulation by maintenance, about to be destroyed.
    Retiring,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "Free"),
            Self::Claimed { .. } => write!(f, "Claimed"),
            Self::Retiring => write!(f, "Retiring"),
        }
    }
}

/// A pre-started sandbox tracked by the pool.
///
/// Ports and handle are fixed at creation. Only the claim state changes,
/// and only under the registry lock.
#[derive(Debug, Clone, Serialize)]
pub struct PoolEntry {
    id: EntryId,
    name: String,
    handle: SandboxHandle,
    ports: EndpointPorts,
    created_at: DateTime<Utc>,
    state: EntryState,
}

impl PoolEntry {
    pub(crate) fn new(id: EntryId, name: String, sandbox: ProvisionedSandbox) -> Self {
        Self {
            id,
            name,
            handle: sandbox.handle,
            ports: EndpointPorts {
                control: sandbox.control_port,
                ide: sandbox.ide_port,
                app: sandbox.app_ports,
            },
            created_at: Utc::now(),
            state: EntryState::Free,
        }
    }

    /// Get the entry ID.
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Current sandbox name (changes once on claim).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provisioner handle of the underlying sandbox.
    pub fn handle(&self) -> &SandboxHandle {
        &self.handle
    }

    /// Ports assigned to the sandbox.
    pub fn ports(&self) -> &EndpointPorts {
        &self.ports
    }

    /// Get the creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the claim state.
    pub fn state(&self) -> &EntryState {
        &self.state
    }

    /// Whether the entry can be reserved.
    pub fn is_free(&self) -> bool {
        self.state == EntryState::Free
    }

    /// Whether the entry has been claimed.
    pub fn is_reserved(&self) -> bool {
        matches!(self.state, EntryState::Claimed { .. })
    }

    /// When the entry was claimed, if it was.
    pub fn reserved_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            EntryState::Claimed { at, .. } => Some(*at),
            _ => None,
        }
    }

    /// Identity the entry was claimed for, if any.
    pub fn claimant(&self) -> Option<&str> {
        match &self.state {
            EntryState::Claimed { claimant, .. } => Some(claimant),
            _ => None,
        }
    }

    pub(crate) fn claim(&mut self, claimant: &str) {
        self.state = EntryState::Claimed {
            claimant: claimant.to_string(),
            at: Utc::now(),
        };
    }

    pub(crate) fn release_claim(&mut self) {
        self.state = EntryState::Free;
    }

    pub(crate) fn retire(&mut self) {
        self.state = EntryState::Retiring;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

#[cfg(test)]
pub(crate) fn test_entry(name: &str) -> PoolEntry {
    PoolEntry::new(
        EntryId::new(),
        name.to_string(),
        ProvisionedSandbox {
            handle: SandboxHandle::new(format!("handle-{name}")),
            control_port: 30001,
            ide_port: 40001,
            app_ports: vec![50001, 55001],
        },
    )
}
