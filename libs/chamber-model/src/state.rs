//! Decoded chamber state snapshots
//!
//! One [`ChamberState`] is produced per poll cycle and superseded by the
//! next; nothing mutates a snapshot after it is built. The alarm vector is
//! decoded from a single packed status word whose bit 0 is the master gate:
//! when the gate is clear, every sub-flag reads as inactive no matter what
//! the raw bits say.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::AlarmKind;

/// Raw register values read in one poll cycle, keyed by register name.
/// Owned by the poll loop that produced it and handed by value downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub timestamp: DateTime<Utc>,
    pub values: HashMap<String, u16>,
}

impl RawSnapshot {
    pub fn new(values: HashMap<String, u16>) -> Self {
        RawSnapshot {
            timestamp: Utc::now(),
            values,
        }
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.values.get(name).copied()
    }
}

/// Bit index of the master "any alarm active" gate in the packed word
pub const GATE_BIT: u8 = 0;

/// Bit index of the seat alarm flag
pub const SEAT_ALARM_BIT: u8 = 1;

/// Explicit bit-index -> alarm-kind table for the packed status word.
/// Bits are counted from the least significant end, so index 0 is the
/// gate and index 1 the seat alarm; the specific condition flags occupy
/// bits 2-8.
pub const ALARM_BITS: [(u8, AlarmKind); 7] = [
    (2, AlarmKind::MainFss),
    (3, AlarmKind::AnteFss),
    (4, AlarmKind::MainFlame),
    (5, AlarmKind::MainSmoke),
    (6, AlarmKind::AnteSmoke),
    (7, AlarmKind::MainHighO2),
    (8, AlarmKind::AnteHighO2),
];

fn bit(word: u16, index: u8) -> bool {
    word >> index & 1 == 1
}

/// The decoded alarm flag vector from one packed status word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlarmStatus {
    /// Master gate: no sub-flag is valid unless this is set
    pub gate: bool,
    pub seat_alarm: bool,
    pub main_fss: bool,
    pub ante_fss: bool,
    pub main_flame: bool,
    pub main_smoke: bool,
    pub ante_smoke: bool,
    pub main_high_o2: bool,
    pub ante_high_o2: bool,
}

impl AlarmStatus {
    /// Decode the packed word. The gate invariant is applied here: with
    /// bit 0 clear the result is all-inactive regardless of the raw bits.
    pub fn from_word(word: u16) -> Self {
        let gate = bit(word, GATE_BIT);
        if !gate {
            return AlarmStatus::default();
        }

        let mut status = AlarmStatus {
            gate,
            seat_alarm: bit(word, SEAT_ALARM_BIT),
            ..AlarmStatus::default()
        };
        for (index, kind) in ALARM_BITS {
            if bit(word, index) {
                status.set(kind, true);
            }
        }
        status
    }

    fn set(&mut self, kind: AlarmKind, value: bool) {
        match kind {
            AlarmKind::SeatAlarm => self.seat_alarm = value,
            AlarmKind::MainFss => self.main_fss = value,
            AlarmKind::AnteFss => self.ante_fss = value,
            AlarmKind::MainFlame => self.main_flame = value,
            AlarmKind::MainSmoke => self.main_smoke = value,
            AlarmKind::AnteSmoke => self.ante_smoke = value,
            AlarmKind::MainHighO2 => self.main_high_o2 = value,
            AlarmKind::AnteHighO2 => self.ante_high_o2 = value,
        }
    }

    /// Whether the given alarm kind is active. The gate is already folded
    /// in at decode time, so this is a plain field read.
    pub fn is_active(&self, kind: AlarmKind) -> bool {
        match kind {
            AlarmKind::SeatAlarm => self.seat_alarm,
            AlarmKind::MainFss => self.main_fss,
            AlarmKind::AnteFss => self.ante_fss,
            AlarmKind::MainFlame => self.main_flame,
            AlarmKind::MainSmoke => self.main_smoke,
            AlarmKind::AnteSmoke => self.ante_smoke,
            AlarmKind::MainHighO2 => self.main_high_o2,
            AlarmKind::AnteHighO2 => self.ante_high_o2,
        }
    }

    pub fn any_active(&self) -> bool {
        AlarmKind::ALL.iter().any(|kind| self.is_active(*kind))
    }
}

/// Resolve a raw seat code (16-24) to its operator-facing label.
/// Codes without a fixed label pass through as their numeral.
pub fn seat_label(code: u16) -> String {
    match code {
        21 => "Nurse".to_string(),
        22 => "Ante 1".to_string(),
        23 => "Ante 2".to_string(),
        24 => "Ante Nurse".to_string(),
        other => other.to_string(),
    }
}

/// Typed snapshot of the whole chamber, one per poll cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChamberState {
    pub timestamp: DateTime<Utc>,
    /// Transport link state at the time of the snapshot
    pub connected: bool,
    /// True when this cycle failed to refresh and the values may be outdated
    pub stale: bool,
    pub auto_mode: bool,
    pub air_mode: bool,
    /// 0-2
    pub ventilation_level: u8,
    /// 0-3
    pub light_level: u8,
    /// 0-3
    pub fan_level: u8,
    pub valve_open: bool,
    pub compressor_on: bool,
    pub chiller_running: bool,
    /// Degrees Celsius, decoded from tenths
    pub chiller_set_temp: f64,
    /// Degrees Celsius, decoded from tenths
    pub chiller_current_temp: f64,
    pub alarms: AlarmStatus,
    /// Raw active seat code (16-24)
    pub seat_code: u16,
}

impl ChamberState {
    /// Placeholder state broadcast while the device has never been read:
    /// disconnected, stale, everything inactive.
    pub fn disconnected() -> Self {
        ChamberState {
            timestamp: Utc::now(),
            connected: false,
            stale: true,
            auto_mode: false,
            air_mode: false,
            ventilation_level: 0,
            light_level: 0,
            fan_level: 0,
            valve_open: false,
            compressor_on: false,
            chiller_running: false,
            chiller_set_temp: 0.0,
            chiller_current_temp: 0.0,
            alarms: AlarmStatus::default(),
            seat_code: 0,
        }
    }

    /// Copy of this state marked stale (and optionally disconnected),
    /// used when a poll cycle fails and the last known values are re-sent.
    pub fn as_stale(&self, connected: bool) -> Self {
        let mut state = self.clone();
        state.timestamp = Utc::now();
        state.stale = true;
        state.connected = connected;
        state
    }

    /// Label for the currently active seat, if a seat alarm is in effect
    pub fn active_seat_label(&self) -> Option<String> {
        if self.alarms.seat_alarm {
            Some(seat_label(self.seat_code))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_clear_masks_all_sub_flags() {
        // Every sub-bit set but the gate clear: nothing is active
        let status = AlarmStatus::from_word(0b0000_0001_1111_1110);
        assert!(!status.gate);
        assert!(!status.any_active());
    }

    #[test]
    fn test_gate_set_exposes_sub_flags() {
        // gate + seat + main smoke (bit 5)
        let status = AlarmStatus::from_word(0b0000_0000_0010_0011);
        assert!(status.gate);
        assert!(status.seat_alarm);
        assert!(status.main_smoke);
        assert!(!status.main_fss);
        assert!(!status.ante_high_o2);
    }

    #[test]
    fn test_bit_table_covers_every_condition_kind() {
        let covered: Vec<AlarmKind> = ALARM_BITS.iter().map(|(_, k)| *k).collect();
        for kind in AlarmKind::ALL {
            if kind == AlarmKind::SeatAlarm {
                continue;
            }
            assert!(covered.contains(&kind), "{kind} missing from ALARM_BITS");
        }
    }

    #[test]
    fn test_seat_labels() {
        assert_eq!(seat_label(21), "Nurse");
        assert_eq!(seat_label(22), "Ante 1");
        assert_eq!(seat_label(23), "Ante 2");
        assert_eq!(seat_label(24), "Ante Nurse");
        assert_eq!(seat_label(17), "17");
    }

    #[test]
    fn test_stale_copy_keeps_values() {
        let mut state = ChamberState::disconnected();
        state.stale = false;
        state.connected = true;
        state.fan_level = 2;

        let stale = state.as_stale(false);
        assert!(stale.stale);
        assert!(!stale.connected);
        assert_eq!(stale.fan_level, 2);
    }
}
