//! Alarm kinds, transitions and events
//!
//! An [`AlarmEvent`] is created on an edge (a flag changing between two
//! consecutive state snapshots), never on steady state. Events are
//! fire-and-forget: the bridge broadcasts them once and does not persist
//! them; historical storage belongs to a downstream collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The discrete alarm conditions the chamber PLC reports.
///
/// FSS = fire suppression system. "Main" is the main chamber, "Ante" the
/// antechamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlarmKind {
    SeatAlarm,
    MainFss,
    AnteFss,
    MainFlame,
    MainSmoke,
    AnteSmoke,
    MainHighO2,
    AnteHighO2,
}

impl AlarmKind {
    /// All kinds in their canonical order. Diffing walks this array, so
    /// multi-alarm transitions (e.g. the gate bit dropping) always emit
    /// events in the same order.
    pub const ALL: [AlarmKind; 8] = [
        AlarmKind::SeatAlarm,
        AlarmKind::MainFss,
        AlarmKind::AnteFss,
        AlarmKind::MainFlame,
        AlarmKind::MainSmoke,
        AlarmKind::AnteSmoke,
        AlarmKind::MainHighO2,
        AlarmKind::AnteHighO2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmKind::SeatAlarm => "seat_alarm",
            AlarmKind::MainFss => "main_fss",
            AlarmKind::AnteFss => "ante_fss",
            AlarmKind::MainFlame => "main_flame",
            AlarmKind::MainSmoke => "main_smoke",
            AlarmKind::AnteSmoke => "ante_smoke",
            AlarmKind::MainHighO2 => "main_high_o2",
            AlarmKind::AnteHighO2 => "ante_high_o2",
        }
    }
}

impl std::fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge direction of an alarm flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmTransition {
    Raised,
    Cleared,
}

/// A single alarm edge, broadcast once to every subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub id: Uuid,
    pub kind: AlarmKind,
    pub transition: AlarmTransition,
    /// Seat label, present only for seat alarms ("Nurse", "Ante 1", ...)
    pub seat_label: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AlarmEvent {
    pub fn raised(kind: AlarmKind) -> Self {
        AlarmEvent {
            id: Uuid::new_v4(),
            kind,
            transition: AlarmTransition::Raised,
            seat_label: None,
            timestamp: Utc::now(),
        }
    }

    pub fn cleared(kind: AlarmKind) -> Self {
        AlarmEvent {
            id: Uuid::new_v4(),
            kind,
            transition: AlarmTransition::Cleared,
            seat_label: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_seat_label(mut self, label: impl Into<String>) -> Self {
        self.seat_label = Some(label.into());
        self
    }

    pub fn is_raised(&self) -> bool {
        self.transition == AlarmTransition::Raised
    }
}
