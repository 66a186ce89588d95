//! Raw snapshot -> chamber state decoding
//!
//! Pure and deterministic: no I/O, no mutable state. The poll loop owns
//! the raw snapshot and calls [`decode_state`] once per cycle; everything
//! here is trivially unit-testable with hand-built snapshots.

use crate::error::ModelError;
use crate::registers::{
    RegisterMap, REG_AIR_MODE, REG_ALARM_WORD, REG_AUTO_MODE, REG_CHILLER_RUN, REG_CHILLER_SET,
    REG_CHILLER_TEMP, REG_COMPRESSOR, REG_FAN_LEVEL, REG_LIGHT_LEVEL, REG_SEAT_CODE,
    REG_VALVE_OPEN, REG_VENT_LEVEL,
};
use crate::state::{AlarmStatus, ChamberState, RawSnapshot};

/// Registers the decoder reads every cycle. This is the poll batch; the
/// map must resolve every entry at startup or the service refuses to run.
pub const POLL_REGISTERS: [&str; 12] = [
    REG_AUTO_MODE,
    REG_AIR_MODE,
    REG_VALVE_OPEN,
    REG_COMPRESSOR,
    REG_FAN_LEVEL,
    REG_LIGHT_LEVEL,
    REG_VENT_LEVEL,
    REG_ALARM_WORD,
    REG_SEAT_CODE,
    REG_CHILLER_SET,
    REG_CHILLER_RUN,
    REG_CHILLER_TEMP,
];

fn required(raw: &RawSnapshot, name: &str) -> Result<u16, ModelError> {
    raw.get(name)
        .ok_or_else(|| ModelError::MissingValue(name.to_string()))
}

/// Decode one raw snapshot into a typed chamber state.
///
/// Level registers are reduced modulo their range so a garbage word from
/// the device can never produce an out-of-range level. Temperatures go
/// through the register's scale (tenths of a degree on this PLC).
pub fn decode_state(map: &RegisterMap, raw: &RawSnapshot) -> Result<ChamberState, ModelError> {
    let alarm_word = required(raw, REG_ALARM_WORD)?;
    let seat_code = required(raw, REG_SEAT_CODE)?;

    let set_reg = map.resolve(REG_CHILLER_SET)?;
    let temp_reg = map.resolve(REG_CHILLER_TEMP)?;

    Ok(ChamberState {
        timestamp: raw.timestamp,
        connected: true,
        stale: false,
        auto_mode: required(raw, REG_AUTO_MODE)? != 0,
        air_mode: required(raw, REG_AIR_MODE)? != 0,
        ventilation_level: (required(raw, REG_VENT_LEVEL)? % 3) as u8,
        light_level: (required(raw, REG_LIGHT_LEVEL)? % 4) as u8,
        fan_level: (required(raw, REG_FAN_LEVEL)? % 4) as u8,
        valve_open: required(raw, REG_VALVE_OPEN)? != 0,
        compressor_on: required(raw, REG_COMPRESSOR)? != 0,
        chiller_running: required(raw, REG_CHILLER_RUN)? != 0,
        chiller_set_temp: set_reg.decode_scaled(required(raw, REG_CHILLER_SET)?),
        chiller_current_temp: temp_reg.decode_scaled(required(raw, REG_CHILLER_TEMP)?),
        alarms: AlarmStatus::from_word(alarm_word),
        seat_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::standard_map;
    use std::collections::HashMap;

    fn snapshot(overrides: &[(&str, u16)]) -> RawSnapshot {
        let mut values: HashMap<String, u16> =
            POLL_REGISTERS.iter().map(|name| (name.to_string(), 0)).collect();
        for (name, value) in overrides {
            values.insert(name.to_string(), *value);
        }
        RawSnapshot::new(values)
    }

    #[test]
    fn test_seat_alarm_with_high_o2_scenario() {
        // gate (bit 0) + seat (bit 1) + main high O2 (bit 7), seat code 22
        let map = standard_map();
        let raw = snapshot(&[
            (REG_ALARM_WORD, 0b0000_0000_1000_0011),
            (REG_SEAT_CODE, 22),
        ]);

        let state = decode_state(&map, &raw).unwrap();
        assert!(state.alarms.gate);
        assert!(state.alarms.seat_alarm);
        assert!(state.alarms.main_high_o2);
        assert!(!state.alarms.main_fss);
        assert!(!state.alarms.ante_fss);
        assert!(!state.alarms.main_flame);
        assert!(!state.alarms.main_smoke);
        assert!(!state.alarms.ante_smoke);
        assert!(!state.alarms.ante_high_o2);
        assert_eq!(state.active_seat_label().as_deref(), Some("Ante 1"));
    }

    #[test]
    fn test_bit_8_is_ante_high_o2() {
        let map = standard_map();
        let raw = snapshot(&[(REG_ALARM_WORD, 0b0000_0001_0000_0001)]);
        let state = decode_state(&map, &raw).unwrap();
        assert!(state.alarms.ante_high_o2);
        assert!(!state.alarms.main_high_o2);
    }

    #[test]
    fn test_gate_clear_yields_no_alarms() {
        // Sub-bits set, gate clear: the whole vector reads inactive
        let map = standard_map();
        let raw = snapshot(&[
            (REG_ALARM_WORD, 0b0000_0001_1111_1110),
            (REG_SEAT_CODE, 22),
        ]);

        let state = decode_state(&map, &raw).unwrap();
        assert!(!state.alarms.any_active());
        assert_eq!(state.active_seat_label(), None);
    }

    #[test]
    fn test_temperatures_decode_from_tenths() {
        let map = standard_map();
        let raw = snapshot(&[
            (REG_CHILLER_SET, 225),
            (REG_CHILLER_TEMP, (-50i16) as u16),
            (REG_CHILLER_RUN, 1),
        ]);

        let state = decode_state(&map, &raw).unwrap();
        assert!((state.chiller_set_temp - 22.5).abs() < f64::EPSILON);
        assert!((state.chiller_current_temp - (-5.0)).abs() < f64::EPSILON);
        assert!(state.chiller_running);
    }

    #[test]
    fn test_levels_reduce_modulo_range() {
        let map = standard_map();
        let raw = snapshot(&[
            (REG_FAN_LEVEL, 7),   // 7 % 4 = 3
            (REG_LIGHT_LEVEL, 4), // 4 % 4 = 0
            (REG_VENT_LEVEL, 5),  // 5 % 3 = 2
        ]);

        let state = decode_state(&map, &raw).unwrap();
        assert_eq!(state.fan_level, 3);
        assert_eq!(state.light_level, 0);
        assert_eq!(state.ventilation_level, 2);
    }

    #[test]
    fn test_missing_register_is_an_error() {
        let map = standard_map();
        let mut raw = snapshot(&[]);
        raw.values.remove(REG_ALARM_WORD);

        let err = decode_state(&map, &raw).unwrap_err();
        assert!(matches!(err, ModelError::MissingValue(name) if name == REG_ALARM_WORD));
    }

    #[test]
    fn test_decode_is_deterministic() {
        let map = standard_map();
        let raw = snapshot(&[(REG_ALARM_WORD, 0b11), (REG_SEAT_CODE, 23)]);
        let a = decode_state(&map, &raw).unwrap();
        let b = decode_state(&map, &raw).unwrap();
        assert_eq!(a, b);
    }
}
