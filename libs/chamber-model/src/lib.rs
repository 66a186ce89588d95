//! Domain model for the hyperbaric chamber PLC bridge
//!
//! This crate holds the pure, I/O-free half of the bridge: the logical
//! register table, the decoded chamber-state snapshot, the alarm event
//! vocabulary, and the raw-word decoding rules. The service crate
//! (`bridgesrv`) owns everything that touches time, tasks or transports.
//!
//! # Modules
//!
//! - [`registers`]: named logical registers, kinds, scales, the map
//! - [`state`]: raw and decoded snapshots, packed alarm word semantics
//! - [`alarm`]: alarm kinds, transitions and broadcast events
//! - [`decode`]: pure `RawSnapshot -> ChamberState` transformation

pub mod alarm;
pub mod decode;
pub mod error;
pub mod registers;
pub mod state;

pub use alarm::{AlarmEvent, AlarmKind, AlarmTransition};
pub use decode::{decode_state, POLL_REGISTERS};
pub use error::ModelError;
pub use registers::{LogicalRegister, RegisterKind, RegisterMap, Scale};
pub use state::{seat_label, AlarmStatus, ChamberState, RawSnapshot};
