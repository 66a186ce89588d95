//! Transport abstraction over the physical device link
//!
//! The bridge core speaks to the device only through [`RegisterTransport`]:
//! named-register batch reads and single-register writes. A concrete
//! protocol driver (Modbus, MC, ...) binds here; the in-tree
//! [`sim::SimTransport`] stands in for hardware in simulation mode and in
//! tests. Read/write calls fail fast with `NotConnected` while the link is
//! down; they never block waiting for a reconnect.

pub mod reconnect;
pub mod sim;

use async_trait::async_trait;

use chamber_model::RawSnapshot;

use crate::error::Result;

/// Connection lifecycle of a transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session and no attempt in progress
    Disconnected,
    /// Initial session establishment in progress
    Connecting,
    /// Session up, reads/writes flowing
    Connected,
    /// Session lost, backoff-gated reattempts running
    Reconnecting,
    /// Gave up (only when a retry bound is configured)
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Raw read/write primitives against the device.
///
/// Implementations own their session and must be safe to share behind an
/// `Arc`: the poll loop and the command drain task call in concurrently.
#[async_trait]
pub trait RegisterTransport: Send + Sync {
    /// Establish the session. Idempotent: connecting while connected is a
    /// no-op success.
    async fn connect(&self) -> Result<()>;

    /// Read every named register in one batch, returning a raw snapshot.
    async fn read_batch(&self, names: &[&str]) -> Result<RawSnapshot>;

    /// Write a single bit register.
    async fn write_bit(&self, name: &str, on: bool) -> Result<()>;

    /// Write a single word register.
    async fn write_register(&self, name: &str, value: i64) -> Result<()>;

    /// Tear the session down.
    async fn disconnect(&self) -> Result<()>;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }
}
