//! In-memory chamber device simulator
//!
//! Stands in for the real PLC in simulation mode and in the test suite:
//! a register bank behind a lock, plus injection hooks for the failure
//! modes the bridge has to survive (read timeouts, dropped sessions,
//! refused writes). Writes are recorded in submission order so tests can
//! assert the FIFO property end to end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use chamber_model::registers::standard_registers;
use chamber_model::RawSnapshot;

use super::{ConnectionState, RegisterTransport};
use crate::error::{BridgeError, Result};

const STATE_DISCONNECTED: u8 = 0;
const STATE_CONNECTED: u8 = 1;
const STATE_FAILED: u8 = 2;

/// A write the simulator accepted, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub register: String,
    pub value: i64,
}

/// Simulated chamber PLC
pub struct SimTransport {
    bank: Arc<Mutex<HashMap<String, u16>>>,
    state: AtomicU8,
    /// Fail the next N batch reads with a timeout
    fail_reads: AtomicU32,
    /// Fail the next N connect attempts
    fail_connects: AtomicU32,
    /// Refuse the next N writes
    reject_writes: AtomicU32,
    writes: Arc<Mutex<Vec<RecordedWrite>>>,
}

impl SimTransport {
    /// Empty bank; reads of unknown names return 0
    pub fn new() -> Self {
        SimTransport {
            bank: Arc::new(Mutex::new(HashMap::new())),
            state: AtomicU8::new(STATE_DISCONNECTED),
            fail_reads: AtomicU32::new(0),
            fail_connects: AtomicU32::new(0),
            reject_writes: AtomicU32::new(0),
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Bank pre-seeded with every register of the standard chamber table
    /// at zero
    pub fn with_standard_bank() -> Self {
        let sim = Self::new();
        {
            let mut bank = sim.bank.try_lock().expect("new simulator is uncontended");
            for reg in standard_registers() {
                bank.insert(reg.name, 0);
            }
        }
        sim
    }

    /// Set a register value directly on the bank (device-side change)
    pub async fn set_register(&self, name: &str, value: u16) {
        self.bank.lock().await.insert(name.to_string(), value);
    }

    pub async fn register_value(&self, name: &str) -> Option<u16> {
        self.bank.lock().await.get(name).copied()
    }

    /// Fail the next `n` batch reads with `ReadTimeout`
    pub fn inject_read_timeouts(&self, n: u32) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` connect attempts
    pub fn inject_connect_failures(&self, n: u32) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Refuse the next `n` writes with `WriteRejected`
    pub fn inject_write_rejections(&self, n: u32) {
        self.reject_writes.store(n, Ordering::SeqCst);
    }

    /// Drop the session as if the cable were pulled
    pub fn drop_connection(&self) {
        self.state.store(STATE_DISCONNECTED, Ordering::SeqCst);
    }

    /// Writes accepted so far, in arrival order
    pub async fn recorded_writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().await.clone()
    }

    fn take_injected(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state.load(Ordering::SeqCst) == STATE_CONNECTED {
            Ok(())
        } else {
            Err(BridgeError::NotConnected)
        }
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegisterTransport for SimTransport {
    async fn connect(&self) -> Result<()> {
        if self.state.load(Ordering::SeqCst) == STATE_CONNECTED {
            return Ok(());
        }
        if Self::take_injected(&self.fail_connects) {
            return Err(BridgeError::connection("simulated connect failure"));
        }
        self.state.store(STATE_CONNECTED, Ordering::SeqCst);
        debug!("simulator session established");
        Ok(())
    }

    async fn read_batch(&self, names: &[&str]) -> Result<RawSnapshot> {
        self.ensure_connected()?;
        if Self::take_injected(&self.fail_reads) {
            return Err(BridgeError::read_timeout("simulated poll timeout"));
        }

        let bank = self.bank.lock().await;
        let values = names
            .iter()
            .map(|name| (name.to_string(), bank.get(*name).copied().unwrap_or(0)))
            .collect();
        Ok(RawSnapshot::new(values))
    }

    async fn write_bit(&self, name: &str, on: bool) -> Result<()> {
        self.write_register(name, i64::from(on)).await
    }

    async fn write_register(&self, name: &str, value: i64) -> Result<()> {
        self.ensure_connected()?;
        if Self::take_injected(&self.reject_writes) {
            return Err(BridgeError::write_rejected(format!(
                "simulated refusal for {name}"
            )));
        }

        self.bank
            .lock()
            .await
            .insert(name.to_string(), value as u16);
        self.writes.lock().await.push(RecordedWrite {
            register: name.to_string(),
            value,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.store(STATE_DISCONNECTED, Ordering::SeqCst);
        debug!("simulator session closed");
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_CONNECTED => ConnectionState::Connected,
            STATE_FAILED => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }
}
