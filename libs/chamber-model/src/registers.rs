//! Logical register definitions for the chamber PLC
//!
//! The bridge never talks to the device in terms of raw protocol addresses.
//! Every readable or writable slot is a [`LogicalRegister`] with a unique
//! name, a kind (bit or word), and a rational scale factor that maps raw
//! integer words to engineering units. The [`RegisterMap`] is built once at
//! startup and is read-only afterwards.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Register kind: a single coil/relay bit or a 16-bit word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterKind {
    /// Single bit (coil / internal relay, M-devices)
    #[serde(rename = "bit", alias = "Bit", alias = "coil")]
    Bit,

    /// Unsigned 16-bit word (R/D-devices holding counts, levels, codes)
    #[serde(rename = "u16", alias = "UnsignedWord", alias = "word")]
    UnsignedWord,

    /// Signed 16-bit word (temperatures and other signed quantities)
    #[serde(rename = "i16", alias = "SignedWord")]
    SignedWord,
}

impl RegisterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterKind::Bit => "bit",
            RegisterKind::UnsignedWord => "u16",
            RegisterKind::SignedWord => "i16",
        }
    }

    /// Bit registers accept only 0/1 writes
    pub fn is_bit(&self) -> bool {
        matches!(self, RegisterKind::Bit)
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rational scale factor between raw register values and engineering units.
///
/// Temperatures on this PLC are stored as tenths of a degree, so the chiller
/// registers carry `Scale::TENTHS` (1/10): raw 225 ↔ 22.5 °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scale {
    pub num: i32,
    pub den: i32,
}

impl Scale {
    /// Identity scale, raw value == engineering value
    pub const UNIT: Scale = Scale { num: 1, den: 1 };

    /// Tenths-of-unit scale used by the temperature registers
    pub const TENTHS: Scale = Scale { num: 1, den: 10 };

    pub const fn new(num: i32, den: i32) -> Self {
        Scale { num, den }
    }

    /// Raw register value -> engineering units
    pub fn apply(&self, raw: i64) -> f64 {
        raw as f64 * self.num as f64 / self.den as f64
    }

    /// Engineering units -> raw register value (rounded to nearest)
    pub fn invert(&self, value: f64) -> i64 {
        (value * self.den as f64 / self.num as f64).round() as i64
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale::UNIT
    }
}

/// A named, typed slot on the controlled device.
///
/// `address` is an opaque token handed to the transport driver; the bridge
/// core never interprets it. For the chamber PLC the tokens follow the
/// Mitsubishi device naming the register names themselves use (M/R/D).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalRegister {
    pub name: String,
    pub kind: RegisterKind,
    #[serde(default)]
    pub scale: Scale,
    pub address: String,
}

impl LogicalRegister {
    pub fn new(name: impl Into<String>, kind: RegisterKind) -> Self {
        let name = name.into();
        let address = name.clone();
        LogicalRegister {
            name,
            kind,
            scale: Scale::UNIT,
            address,
        }
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Decode a raw word from this register into engineering units,
    /// honouring signedness before scaling.
    pub fn decode_scaled(&self, raw: u16) -> f64 {
        let raw = match self.kind {
            RegisterKind::SignedWord => raw as i16 as i64,
            _ => raw as i64,
        };
        self.scale.apply(raw)
    }

    /// Encode an engineering-unit value into the raw word this register
    /// expects. A 22.5 °C setpoint on a tenths-scaled register encodes
    /// to 225.
    pub fn encode_scaled(&self, value: f64) -> i64 {
        self.scale.invert(value)
    }
}

/// Immutable name -> register table, built once at startup.
///
/// Names are globally unique; construction fails on a duplicate rather
/// than silently shadowing an entry.
#[derive(Debug, Clone, Default)]
pub struct RegisterMap {
    registers: HashMap<String, LogicalRegister>,
}

impl RegisterMap {
    pub fn new(registers: Vec<LogicalRegister>) -> Result<Self, ModelError> {
        let mut map = HashMap::with_capacity(registers.len());
        for reg in registers {
            if map.contains_key(&reg.name) {
                return Err(ModelError::DuplicateRegister(reg.name));
            }
            map.insert(reg.name.clone(), reg);
        }
        Ok(RegisterMap { registers: map })
    }

    /// Look up a register by name
    pub fn resolve(&self, name: &str) -> Result<&LogicalRegister, ModelError> {
        self.registers
            .get(name)
            .ok_or_else(|| ModelError::UnknownRegister(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Verify that every name in `required` resolves; used at startup to
    /// fail fast on a configuration mismatch before polling begins.
    pub fn validate_required(&self, required: &[&str]) -> Result<(), ModelError> {
        for name in required {
            self.resolve(name)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogicalRegister> {
        self.registers.values()
    }
}

// ============================================================================
// Standard chamber register table
// ============================================================================

/// Alarm acknowledge bit
pub const REG_ALARM_ACK: &str = "M0400";
/// Auto mode bit
pub const REG_AUTO_MODE: &str = "M0401";
/// Air mode bit
pub const REG_AIR_MODE: &str = "M0402";
/// Main valve open bit
pub const REG_VALVE_OPEN: &str = "M0500";
/// Main valve close bit (write side of the valve pair)
pub const REG_VALVE_CLOSE: &str = "M0501";
/// Compressor run bit
pub const REG_COMPRESSOR: &str = "M0502";
/// Seat alarm reset register
pub const REG_SEAT_RESET: &str = "R0030";
/// Packed alarm/status word, polled every cycle
pub const REG_ALARM_WORD: &str = "R0100";
/// Active seat code register (16-24)
pub const REG_SEAT_CODE: &str = "R0101";
/// Fan level register (0-3)
pub const REG_FAN_LEVEL: &str = "R01700";
/// Light level register (0-3)
pub const REG_LIGHT_LEVEL: &str = "R01702";
/// Ventilation level register (0-2)
pub const REG_VENT_LEVEL: &str = "R01704";
/// Chiller setpoint, tenths of a degree
pub const REG_CHILLER_SET: &str = "D00202";
/// Chiller run/stop
pub const REG_CHILLER_RUN: &str = "D00208";
/// Chiller current temperature, tenths of a degree
pub const REG_CHILLER_TEMP: &str = "D00300";

/// The compiled-in register table for the standard chamber PLC layout.
/// Deployments with a different device map override it in configuration.
pub fn standard_registers() -> Vec<LogicalRegister> {
    vec![
        LogicalRegister::new(REG_ALARM_ACK, RegisterKind::Bit),
        LogicalRegister::new(REG_AUTO_MODE, RegisterKind::Bit),
        LogicalRegister::new(REG_AIR_MODE, RegisterKind::Bit),
        LogicalRegister::new(REG_VALVE_OPEN, RegisterKind::Bit),
        LogicalRegister::new(REG_VALVE_CLOSE, RegisterKind::Bit),
        LogicalRegister::new(REG_COMPRESSOR, RegisterKind::Bit),
        LogicalRegister::new(REG_SEAT_RESET, RegisterKind::UnsignedWord),
        LogicalRegister::new(REG_ALARM_WORD, RegisterKind::UnsignedWord),
        LogicalRegister::new(REG_SEAT_CODE, RegisterKind::UnsignedWord),
        LogicalRegister::new(REG_FAN_LEVEL, RegisterKind::UnsignedWord),
        LogicalRegister::new(REG_LIGHT_LEVEL, RegisterKind::UnsignedWord),
        LogicalRegister::new(REG_VENT_LEVEL, RegisterKind::UnsignedWord),
        LogicalRegister::new(REG_CHILLER_SET, RegisterKind::SignedWord).with_scale(Scale::TENTHS),
        LogicalRegister::new(REG_CHILLER_RUN, RegisterKind::UnsignedWord),
        LogicalRegister::new(REG_CHILLER_TEMP, RegisterKind::SignedWord).with_scale(Scale::TENTHS),
    ]
}

/// Standard table wrapped in a map
pub fn standard_map() -> RegisterMap {
    // The compiled-in table has no duplicates
    RegisterMap::new(standard_registers()).expect("standard register table is valid")
}
