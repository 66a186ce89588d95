//! Serialized register writes
//!
//! Clients submit [`WriteCommand`]s from any task; a single drain task
//! applies them to the transport strictly in submission order. The queue
//! is bounded: during a sustained disconnect commands accumulate up to the
//! bound and further submissions fail with `QueueFull` instead of growing
//! memory without signal. The queue never coalesces or de-duplicates —
//! a slider that fires on every drag tick is the caller's problem to
//! debounce before submitting.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::transport::RegisterTransport;

/// Whether a command targets a bit or a word register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Bit,
    Word,
}

/// One client-issued register write, owned by the queue until flushed
#[derive(Debug, Clone)]
pub struct WriteCommand {
    pub register: String,
    pub value: i64,
    pub kind: WriteKind,
    pub submitted_at: DateTime<Utc>,
}

impl WriteCommand {
    pub fn bit(register: impl Into<String>, on: bool) -> Self {
        WriteCommand {
            register: register.into(),
            value: i64::from(on),
            kind: WriteKind::Bit,
            submitted_at: Utc::now(),
        }
    }

    pub fn word(register: impl Into<String>, value: i64) -> Self {
        WriteCommand {
            register: register.into(),
            value,
            kind: WriteKind::Word,
            submitted_at: Utc::now(),
        }
    }
}

/// Producer side: cheap to clone, safe from any task
#[derive(Clone)]
pub struct CommandQueue {
    tx: mpsc::Sender<WriteCommand>,
}

impl CommandQueue {
    /// Create the queue and the receiver the drain task consumes
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WriteCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (CommandQueue { tx }, rx)
    }

    /// Enqueue without blocking. Fails with `QueueFull` when the backlog
    /// bound is hit; the caller decides whether to drop or retry.
    pub fn submit(&self, command: WriteCommand) -> Result<()> {
        self.tx.try_send(command).map_err(|err| match err {
            mpsc::error::TrySendError::Full(cmd) => {
                warn!(register = %cmd.register, "command queue full, rejecting write");
                BridgeError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => {
                BridgeError::internal("command drain task is gone")
            }
        })
    }
}

/// Consumer side: one task, strict FIFO
pub struct CommandDrain {
    rx: mpsc::Receiver<WriteCommand>,
    transport: Arc<dyn RegisterTransport>,
    retry_interval: Duration,
}

impl CommandDrain {
    pub fn new(
        rx: mpsc::Receiver<WriteCommand>,
        transport: Arc<dyn RegisterTransport>,
        retry_interval: Duration,
    ) -> Self {
        CommandDrain {
            rx,
            transport,
            retry_interval,
        }
    }

    /// Drain until cancelled. Queued commands remaining at shutdown are
    /// discarded, with the count logged.
    pub async fn run(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                command = self.rx.recv() => {
                    match command {
                        Some(command) => {
                            if !self.apply(command, &token).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        self.rx.close();
        let mut dropped = 0usize;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "discarded queued commands at shutdown");
        }
    }

    /// Apply one command. While the transport is down the command is held
    /// and re-attempted, preserving the global order; a device refusal is
    /// logged and dropped (the refusal shows up as the absence of the
    /// change in later state broadcasts). Returns false when cancelled
    /// mid-hold.
    async fn apply(&self, command: WriteCommand, token: &CancellationToken) -> bool {
        loop {
            let result = match command.kind {
                WriteKind::Bit => {
                    self.transport
                        .write_bit(&command.register, command.value != 0)
                        .await
                }
                WriteKind::Word => {
                    self.transport
                        .write_register(&command.register, command.value)
                        .await
                }
            };

            match result {
                Ok(()) => {
                    debug!(register = %command.register, value = command.value, "write applied");
                    return true;
                }
                Err(BridgeError::NotConnected) => {
                    tokio::select! {
                        _ = token.cancelled() => return false,
                        _ = tokio::time::sleep(self.retry_interval) => {}
                    }
                }
                Err(BridgeError::WriteRejected(reason)) => {
                    warn!(register = %command.register, %reason, "device refused write, dropping");
                    return true;
                }
                Err(err) => {
                    warn!(register = %command.register, %err, "write failed, dropping");
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::sim::SimTransport;

    async fn wait_for<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within deadline");
    }

    #[tokio::test]
    async fn test_commands_apply_in_submission_order() {
        let sim = Arc::new(SimTransport::new());
        sim.connect().await.unwrap();

        let (queue, rx) = CommandQueue::new(16);
        let token = CancellationToken::new();
        let drain = CommandDrain::new(rx, sim.clone(), Duration::from_millis(10));
        let handle = tokio::spawn(drain.run(token.clone()));

        queue.submit(WriteCommand::word("D00202", 225)).unwrap();
        queue.submit(WriteCommand::bit("D00208", true)).unwrap();
        queue.submit(WriteCommand::bit("M0400", true)).unwrap();

        let sim_probe = sim.clone();
        wait_for(|| {
            let sim = sim_probe.clone();
            async move { sim.recorded_writes().await.len() == 3 }
        })
        .await;

        let writes = sim.recorded_writes().await;
        let order: Vec<&str> = writes.iter().map(|w| w.register.as_str()).collect();
        assert_eq!(order, vec!["D00202", "D00208", "M0400"]);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_backlog_bound_rejects_with_queue_full() {
        // No drain task running: the channel itself is the backlog
        let (queue, _rx) = CommandQueue::new(2);

        queue.submit(WriteCommand::bit("M0400", true)).unwrap();
        queue.submit(WriteCommand::bit("M0401", true)).unwrap();
        let err = queue.submit(WriteCommand::bit("M0402", true)).unwrap_err();
        assert!(matches!(err, BridgeError::QueueFull));
    }

    #[tokio::test]
    async fn test_command_held_across_disconnect_then_applied() {
        let sim = Arc::new(SimTransport::new());
        // Not connected yet: the first command will be held

        let (queue, rx) = CommandQueue::new(16);
        let token = CancellationToken::new();
        let drain = CommandDrain::new(rx, sim.clone(), Duration::from_millis(5));
        let handle = tokio::spawn(drain.run(token.clone()));

        queue.submit(WriteCommand::word("D00202", 180)).unwrap();
        queue.submit(WriteCommand::bit("D00208", true)).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(sim.recorded_writes().await.is_empty());

        sim.connect().await.unwrap();
        let sim_probe = sim.clone();
        wait_for(|| {
            let sim = sim_probe.clone();
            async move { sim.recorded_writes().await.len() == 2 }
        })
        .await;

        // Order survived the hold
        let writes = sim.recorded_writes().await;
        assert_eq!(writes[0].register, "D00202");
        assert_eq!(writes[1].register, "D00208");

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_write_is_dropped_not_retried() {
        let sim = Arc::new(SimTransport::new());
        sim.connect().await.unwrap();
        sim.inject_write_rejections(1);

        let (queue, rx) = CommandQueue::new(16);
        let token = CancellationToken::new();
        let drain = CommandDrain::new(rx, sim.clone(), Duration::from_millis(5));
        let handle = tokio::spawn(drain.run(token.clone()));

        queue.submit(WriteCommand::bit("M0500", true)).unwrap();
        queue.submit(WriteCommand::bit("M0501", true)).unwrap();

        let sim_probe = sim.clone();
        wait_for(|| {
            let sim = sim_probe.clone();
            async move { sim.recorded_writes().await.len() == 1 }
        })
        .await;

        // Only the second write landed; the refused one was not replayed
        let writes = sim.recorded_writes().await;
        assert_eq!(writes[0].register, "M0501");

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_during_hold_discards_backlog() {
        let sim = Arc::new(SimTransport::new());

        let (queue, rx) = CommandQueue::new(16);
        let token = CancellationToken::new();
        let drain = CommandDrain::new(rx, sim.clone(), Duration::from_millis(5));
        let handle = tokio::spawn(drain.run(token.clone()));

        queue.submit(WriteCommand::bit("M0400", true)).unwrap();
        queue.submit(WriteCommand::bit("M0401", true)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        token.cancel();
        handle.await.unwrap();
        assert!(sim.recorded_writes().await.is_empty());
    }
}
