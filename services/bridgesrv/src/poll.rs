//! The poll loop
//!
//! One task owns the whole read-side pipeline: tick, batch-read, decode,
//! alarm-diff, broadcast. Decoding and diffing are cheap and pure, so they
//! run synchronously inside the cycle; the alarm engine and its mute table
//! are therefore touched by exactly one task and need no locks. Mute and
//! unmute requests arrive over a control channel and are drained at the
//! top of each cycle to keep that confinement intact.
//!
//! Ticks use `MissedTickBehavior::Skip`: if a cycle overruns the interval,
//! late ticks are dropped instead of queuing, which bounds staleness
//! rather than building a backlog.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use chamber_model::{decode_state, AlarmKind, ChamberState, RegisterMap, POLL_REGISTERS};

use crate::alarm_engine::AlarmEngine;
use crate::hub::{BridgeEvent, Subscribers};
use crate::transport::reconnect::ReconnectTracker;
use crate::transport::RegisterTransport;

/// Mute-table requests routed into the poll task
#[derive(Debug)]
pub enum EngineControl {
    Mute {
        kind: AlarmKind,
        chamber: String,
        duration: Option<Duration>,
    },
    Unmute {
        kind: AlarmKind,
        chamber: String,
    },
}

pub struct PollLoop {
    transport: Arc<dyn RegisterTransport>,
    map: Arc<RegisterMap>,
    engine: AlarmEngine,
    tracker: ReconnectTracker,
    control_rx: mpsc::Receiver<EngineControl>,
    subscribers: Arc<Subscribers>,
    interval: Duration,
    /// Last successfully decoded state, re-sent (marked stale) on failed
    /// cycles
    last_good: Option<ChamberState>,
}

impl PollLoop {
    pub fn new(
        transport: Arc<dyn RegisterTransport>,
        map: Arc<RegisterMap>,
        engine: AlarmEngine,
        tracker: ReconnectTracker,
        control_rx: mpsc::Receiver<EngineControl>,
        subscribers: Arc<Subscribers>,
        interval: Duration,
    ) -> Self {
        PollLoop {
            transport,
            map,
            engine,
            tracker,
            control_rx,
            subscribers,
            interval,
            last_good: None,
        }
    }

    /// Run until cancelled. Never panics on transport trouble: a failed
    /// cycle broadcasts the previous state marked stale and the schedule
    /// carries on.
    pub async fn run(mut self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = self.interval.as_millis() as u64, "poll loop started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            self.drain_control();

            if !self.transport.is_connected() && !self.try_reconnect().await {
                self.broadcast_stale(false);
                continue;
            }

            self.cycle().await;
        }

        info!("poll loop stopped");
    }

    /// Apply queued mute/unmute requests before the cycle reads
    fn drain_control(&mut self) {
        while let Ok(control) = self.control_rx.try_recv() {
            match control {
                EngineControl::Mute {
                    kind,
                    chamber,
                    duration,
                } => self.engine.mute(kind, &chamber, duration),
                EngineControl::Unmute { kind, chamber } => self.engine.unmute(kind, &chamber),
            }
        }
    }

    /// Backoff-gated reconnect attempt; returns whether the link is up
    async fn try_reconnect(&mut self) -> bool {
        let now = Instant::now();
        if !self.tracker.should_attempt(now) {
            return false;
        }

        match self.transport.connect().await {
            Ok(()) => {
                self.tracker.note_success();
                info!("transport connected");
                true
            }
            Err(err) => {
                self.tracker.note_failure(Instant::now());
                debug!(
                    %err,
                    failures = self.tracker.consecutive_failures(),
                    "connect attempt failed"
                );
                false
            }
        }
    }

    async fn cycle(&mut self) {
        match self.transport.read_batch(&POLL_REGISTERS).await {
            Ok(raw) => match decode_state(&self.map, &raw) {
                Ok(state) => {
                    let events = self.engine.observe(&state);
                    self.last_good = Some(state.clone());
                    self.subscribers.broadcast(&BridgeEvent::State(state));
                    for event in events {
                        self.subscribers.broadcast(&BridgeEvent::Alarm(event));
                    }
                }
                Err(err) => {
                    // A validated map makes this unreachable in practice;
                    // if the transport ever returns a short batch we treat
                    // the cycle as failed rather than guess at values.
                    error!(%err, "snapshot decode failed");
                    self.broadcast_stale(self.transport.is_connected());
                }
            },
            Err(err) if err.is_transient() => {
                warn!(%err, "poll cycle skipped");
                self.broadcast_stale(self.transport.is_connected());
            }
            Err(err) => {
                error!(%err, "poll read failed");
                self.broadcast_stale(self.transport.is_connected());
            }
        }
    }

    /// Re-send the last known state marked stale so subscribers learn the
    /// data may be outdated; the alarm engine sees it too, which by
    /// contract changes nothing.
    fn broadcast_stale(&mut self, connected: bool) {
        let state = match &self.last_good {
            Some(state) => state.as_stale(connected),
            None => {
                let mut state = ChamberState::disconnected();
                state.connected = connected;
                state
            }
        };
        let events = self.engine.observe(&state);
        debug_assert!(events.is_empty(), "stale snapshots must not produce edges");
        self.subscribers.broadcast(&BridgeEvent::State(state));
    }
}
