//! Host port allocation.

use crate::error::{DockerError, Result};
use std::net::TcpListener;

/// Inclusive range of host ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

/// Control server ports.
pub const CONTROL_PORTS: PortRange = PortRange { start: 30000, end: 39999 };
/// IDE server ports.
pub const IDE_PORTS: PortRange = PortRange { start: 40000, end: 49999 };
/// First application port.
pub const APP_PORTS_1: PortRange = PortRange { start: 50000, end: 54999 };
/// Second application port.
pub const APP_PORTS_2: PortRange = PortRange { start: 55000, end: 59999 };

const MAX_ATTEMPTS: usize = 50;

impl PortRange {
    fn len(&self) -> u32 {
        u32::from(self.end) - u32::from(self.start) + 1
    }

    fn nth(&self, offset: u32) -> u16 {
        // offset < len() keeps this within u16
        (u32::from(self.start) + offset % self.len()) as u16
    }
}

/// Whether a TCP listener can currently bind `port` on all interfaces.
pub fn is_port_free(port: u16) -> bool {
    TcpListener::bind(("0.0.0.0", port)).is_ok()
}

/// Pick a bindable port in `range`, starting at a random offset.
pub fn find_available_port(range: PortRange) -> Result<u16> {
    find_port_with(range, random_offset(), is_port_free)
}

fn random_offset() -> u32 {
    (uuid::Uuid::new_v4().as_u128() % u128::from(u32::MAX)) as u32
}

fn find_port_with(range: PortRange, offset: u32, is_free: impl Fn(u16) -> bool) -> Result<u16> {
    let attempts = MAX_ATTEMPTS.min(range.len() as usize) as u32;
    (0..attempts)
        .map(|i| range.nth(offset.wrapping_add(i)))
        .find(|&port| is_free(port))
        .ok_or(DockerError::NoFreePort {
            start: range.start,
            end: range.end,
        })
}
