//! Chamber PLC register bridge service
//!
//! `bridgesrv` keeps a session to the chamber PLC, polls its registers on
//! a fixed cadence, decodes them into typed chamber-state snapshots,
//! detects alarm edges, and fans both out to any number of subscribed
//! clients. Writes from those clients are serialized through a bounded
//! FIFO queue so rapid multi-register sequences (setpoint then run bit)
//! are never reordered.
//!
//! # Architecture
//!
//! ```text
//! transport ──► poll loop ──► decoder ──► alarm engine ──► hub ──► subscribers
//!     ▲                                                     │
//!     └──────────────── command queue ◄─────────────────────┘
//! ```
//!
//! The poll task is the single writer into the alarm engine and its mute
//! table; the command drain task is the single consumer of the write
//! queue. Subscribers ride bounded channels and are dropped on overflow
//! rather than allowed to stall polling.

pub mod alarm_engine;
pub mod command;
pub mod config;
pub mod error;
pub mod hub;
pub mod poll;
pub mod transport;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use hub::{BridgeEvent, BridgeHub, BridgeSubscription};
pub use transport::{ConnectionState, RegisterTransport};
