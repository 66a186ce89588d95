//! The bridge hub
//!
//! Coordinator that owns the poll task, the command drain task and the
//! subscriber registry, and exposes the whole external surface: subscribe
//! for the event feed, write/mute calls for the command side. Commands
//! are fire-and-forget — success of the eventual physical write shows up
//! (or fails to) in subsequent state broadcasts, never as a synchronous
//! return.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chamber_model::{AlarmEvent, AlarmKind, ChamberState, RegisterMap, POLL_REGISTERS};

use crate::alarm_engine::AlarmEngine;
use crate::command::{CommandDrain, CommandQueue, WriteCommand};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::poll::{EngineControl, PollLoop};
use crate::transport::reconnect::{BackoffPolicy, ReconnectTracker};
use crate::transport::{ConnectionState, RegisterTransport};

/// Events delivered on every subscriber feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    State(ChamberState),
    Alarm(AlarmEvent),
}

/// One client's view of the feed
pub struct BridgeSubscription {
    id: u64,
    rx: mpsc::Receiver<BridgeEvent>,
}

impl BridgeSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once this subscriber has been dropped
    /// (overflow eviction or bridge shutdown).
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        self.rx.recv().await
    }
}

/// Fan-out registry. Slow consumers are evicted on overflow so one
/// stalled UI client can never backpressure register polling.
pub struct Subscribers {
    senders: DashMap<u64, mpsc::Sender<BridgeEvent>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Subscribers {
    pub fn new(buffer: usize) -> Self {
        Subscribers {
            senders: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer,
        }
    }

    pub fn subscribe(&self) -> BridgeSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.senders.insert(id, tx);
        BridgeSubscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        self.senders.remove(&id);
    }

    pub fn count(&self) -> usize {
        self.senders.len()
    }

    /// Deliver to every subscriber without blocking; full or closed
    /// channels cost that subscriber its registration, nothing more.
    pub fn broadcast(&self, event: &BridgeEvent) {
        let mut evicted = Vec::new();
        for entry in self.senders.iter() {
            if let Err(err) = entry.value().try_send(event.clone()) {
                match err {
                    mpsc::error::TrySendError::Full(_) => {
                        warn!(subscriber = *entry.key(), "subscriber too slow, dropping");
                    }
                    mpsc::error::TrySendError::Closed(_) => {}
                }
                evicted.push(*entry.key());
            }
        }
        for id in evicted {
            self.senders.remove(&id);
        }
    }
}

/// The running bridge
pub struct BridgeHub {
    map: Arc<RegisterMap>,
    subscribers: Arc<Subscribers>,
    queue: CommandQueue,
    control_tx: mpsc::Sender<EngineControl>,
    transport: Arc<dyn RegisterTransport>,
    token: CancellationToken,
    poll_handle: JoinHandle<()>,
    drain_handle: JoinHandle<()>,
}

impl BridgeHub {
    /// Validate the register map, spawn the poll and drain tasks, and
    /// hand back the running hub. Fails fast (before any task starts) on
    /// a register table that cannot serve the poll batch.
    pub fn start(
        config: &BridgeConfig,
        map: RegisterMap,
        transport: Arc<dyn RegisterTransport>,
    ) -> Result<Self> {
        map.validate_required(&POLL_REGISTERS)?;
        let map = Arc::new(map);

        let subscribers = Arc::new(Subscribers::new(config.subscribers.buffer));
        let (queue, command_rx) = CommandQueue::new(config.commands.queue_capacity);
        let (control_tx, control_rx) = mpsc::channel(32);
        let token = CancellationToken::new();

        let engine =
            AlarmEngine::new(config.service.chamber.as_str(), config.default_mute_duration());
        let tracker = ReconnectTracker::new(BackoffPolicy::from(&config.transport.reconnect));

        let poll = PollLoop::new(
            Arc::clone(&transport),
            Arc::clone(&map),
            engine,
            tracker,
            control_rx,
            Arc::clone(&subscribers),
            config.poll_interval(),
        );
        let poll_handle = tokio::spawn(poll.run(token.clone()));

        let drain = CommandDrain::new(
            command_rx,
            Arc::clone(&transport),
            config.command_retry_interval(),
        );
        let drain_handle = tokio::spawn(drain.run(token.clone()));

        info!(chamber = %config.service.chamber, "bridge hub started");

        Ok(BridgeHub {
            map,
            subscribers,
            queue,
            control_tx,
            transport,
            token,
            poll_handle,
            drain_handle,
        })
    }

    /// Attach a new feed consumer
    pub fn subscribe(&self) -> BridgeSubscription {
        self.subscribers.subscribe()
    }

    /// Detach a feed consumer without waiting for eviction
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.unsubscribe(id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.count()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Queue a bit write. Fails fast on an unknown or non-bit register;
    /// the physical write itself is fire-and-forget.
    pub fn write_bit(&self, register: &str, on: bool) -> Result<()> {
        let reg = self.map.resolve(register)?;
        if !reg.kind.is_bit() {
            return Err(BridgeError::data(format!(
                "register {register} is a {} register, not a bit",
                reg.kind
            )));
        }
        self.queue.submit(WriteCommand::bit(register, on))
    }

    /// Queue a word write. Fails fast on an unknown or bit register.
    pub fn write_register(&self, register: &str, value: i64) -> Result<()> {
        let reg = self.map.resolve(register)?;
        if reg.kind.is_bit() {
            return Err(BridgeError::data(format!(
                "register {register} is a bit register, use write_bit"
            )));
        }
        self.queue.submit(WriteCommand::word(register, value))
    }

    /// Suppress Raised broadcasts for an alarm kind on the given chamber.
    /// Software-side only: no device bits are written. `None` applies the
    /// configured default duration.
    pub fn mute_alarm(
        &self,
        kind: AlarmKind,
        chamber: &str,
        duration: Option<Duration>,
    ) -> Result<()> {
        self.send_control(EngineControl::Mute {
            kind,
            chamber: chamber.to_string(),
            duration,
        })
    }

    /// Lift a mute before it expires
    pub fn unmute_alarm(&self, kind: AlarmKind, chamber: &str) -> Result<()> {
        self.send_control(EngineControl::Unmute {
            kind,
            chamber: chamber.to_string(),
        })
    }

    fn send_control(&self, control: EngineControl) -> Result<()> {
        self.control_tx
            .try_send(control)
            .map_err(|_| BridgeError::internal("poll task is not accepting control messages"))
    }

    /// Stop the poll schedule, discard queued commands, disconnect the
    /// transport. Subscriber channels close as a side effect of the tasks
    /// dropping their senders.
    pub async fn shutdown(self) -> Result<()> {
        info!("bridge hub shutting down");
        self.token.cancel();
        let _ = self.poll_handle.await;
        let _ = self.drain_handle.await;
        self.transport.disconnect().await?;
        Ok(())
    }
}
