//! Bridge service configuration
//!
//! Loaded through figment: a YAML file merged with `BRIDGESRV_`-prefixed
//! environment overrides. Every field has a serde default so an empty file
//! (or no file at all) yields a runnable simulation setup.

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use chamber_model::registers::standard_map;
use chamber_model::{LogicalRegister, RegisterKind, RegisterMap, Scale, POLL_REGISTERS};

use crate::error::{BridgeError, Result};

/// Service identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Chamber key this bridge instance serves; mute requests are scoped
    /// to it
    #[serde(default = "default_chamber")]
    pub chamber: String,
}

fn default_service_name() -> String {
    "bridgesrv".to_string()
}

fn default_chamber() -> String {
    "main".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            name: default_service_name(),
            chamber: default_chamber(),
        }
    }
}

/// Transport endpoint and reconnection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Driver endpoint. `sim://` selects the in-memory simulator; a real
    /// deployment binds a protocol driver to another scheme here.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_reconnect")]
    pub reconnect: ReconnectConfig,
}

fn default_endpoint() -> String {
    "sim://chamber".to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            endpoint: default_endpoint(),
            reconnect: default_reconnect(),
        }
    }
}

/// Exponential backoff parameters for reconnection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_initial_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_reconnect_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_reconnect_initial_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_reconnect_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay_ms: default_reconnect_initial_ms(),
        max_delay_ms: default_reconnect_max_ms(),
        multiplier: default_reconnect_multiplier(),
        jitter: true,
    }
}

/// Poll cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Command queue sizing and retry cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Bounded backlog; submissions beyond it fail with QueueFull
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How often a held command re-attempts while the transport is down
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_queue_capacity() -> usize {
    64
}

fn default_retry_interval_ms() -> u64 {
    250
}

impl Default for CommandConfig {
    fn default() -> Self {
        CommandConfig {
            queue_capacity: default_queue_capacity(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

/// Subscriber fan-out sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Per-subscriber channel depth; overflow disconnects the subscriber
    #[serde(default = "default_subscriber_buffer")]
    pub buffer: usize,
}

fn default_subscriber_buffer() -> usize {
    32
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        SubscriberConfig {
            buffer: default_subscriber_buffer(),
        }
    }
}

/// Alarm handling knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Mute duration when the caller does not pass one
    #[serde(default = "default_mute_secs")]
    pub default_mute_secs: u64,
}

fn default_mute_secs() -> u64 {
    300
}

impl Default for AlarmConfig {
    fn default() -> Self {
        AlarmConfig {
            default_mute_secs: default_mute_secs(),
        }
    }
}

/// One register table entry in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterEntry {
    pub name: String,
    pub kind: RegisterKind,
    #[serde(default)]
    pub scale: Option<Scale>,
    /// Driver address token; defaults to the register name
    #[serde(default)]
    pub address: Option<String>,
}

impl From<RegisterEntry> for LogicalRegister {
    fn from(entry: RegisterEntry) -> Self {
        let mut reg = LogicalRegister::new(entry.name, entry.kind);
        if let Some(scale) = entry.scale {
            reg = reg.with_scale(scale);
        }
        if let Some(address) = entry.address {
            reg = reg.with_address(address);
        }
        reg
    }
}

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub commands: CommandConfig,
    #[serde(default)]
    pub subscribers: SubscriberConfig,
    #[serde(default)]
    pub alarms: AlarmConfig,
    /// Register table override; empty means the compiled-in chamber table
    #[serde(default)]
    pub registers: Vec<RegisterEntry>,
}

impl BridgeConfig {
    /// Load from a YAML file merged with `BRIDGESRV_*` env overrides
    pub fn load(path: &Path) -> Result<Self> {
        let config: BridgeConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("BRIDGESRV_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Defaults merged with env only (no file on disk)
    pub fn from_env() -> Result<Self> {
        let config: BridgeConfig = Figment::new()
            .merge(Env::prefixed("BRIDGESRV_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Build and validate the register map: unique names, and every
    /// register the decoder polls must resolve. Fails before the poll
    /// loop ever starts.
    pub fn register_map(&self) -> Result<RegisterMap> {
        let map = if self.registers.is_empty() {
            standard_map()
        } else {
            let regs: Vec<LogicalRegister> =
                self.registers.iter().cloned().map(Into::into).collect();
            RegisterMap::new(regs)?
        };
        map.validate_required(&POLL_REGISTERS)?;
        Ok(map)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }

    pub fn command_retry_interval(&self) -> Duration {
        Duration::from_millis(self.commands.retry_interval_ms)
    }

    pub fn default_mute_duration(&self) -> Duration {
        Duration::from_secs(self.alarms.default_mute_secs)
    }

    pub fn uses_simulator(&self) -> bool {
        self.transport.endpoint.starts_with("sim://")
    }
}

/// A config whose register list omits a polled register is rejected with
/// the offending name, so operators see exactly what the table is missing.
pub fn validate(config: &BridgeConfig) -> Result<()> {
    if config.polling.interval_ms == 0 {
        return Err(BridgeError::config("polling.interval_ms must be non-zero"));
    }
    if config.commands.queue_capacity == 0 {
        return Err(BridgeError::config(
            "commands.queue_capacity must be non-zero",
        ));
    }
    if config.subscribers.buffer == 0 {
        return Err(BridgeError::config("subscribers.buffer must be non-zero"));
    }
    config.register_map().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chamber_model::registers::standard_registers;
    use std::io::Write;

    #[test]
    fn test_empty_yaml_yields_runnable_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{}}").unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.service.name, "bridgesrv");
        assert_eq!(config.polling.interval_ms, 500);
        assert_eq!(config.commands.queue_capacity, 64);
        assert!(config.uses_simulator());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_yaml_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "service:\n  chamber: chamber-2\npolling:\n  interval_ms: 250\ntransport:\n  endpoint: mc://10.0.0.5:5007"
        )
        .unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.service.chamber, "chamber-2");
        assert_eq!(config.polling.interval_ms, 250);
        assert!(!config.uses_simulator());
    }

    #[test]
    fn test_register_table_override_must_cover_poll_set() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // A one-entry table cannot satisfy the decoder's poll set
        writeln!(
            file,
            "registers:\n  - name: M0401\n    kind: bit"
        )
        .unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        let err = config.register_map().unwrap_err();
        assert!(matches!(err, BridgeError::UnknownRegister(_)));
    }

    #[test]
    fn test_full_register_override_parses_scales() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut yaml = String::from("registers:\n");
        for name in POLL_REGISTERS {
            yaml.push_str(&format!("  - name: {name}\n    kind: u16\n"));
        }
        yaml.push_str("  - name: D00400\n    kind: i16\n    scale: {num: 1, den: 10}\n");
        writeln!(file, "{yaml}").unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        let map = config.register_map().unwrap();
        let reg = map.resolve("D00400").unwrap();
        assert_eq!(reg.scale, Scale::TENTHS);
        assert_eq!(reg.encode_scaled(22.5), 225);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = BridgeConfig {
            polling: PollingConfig { interval_ms: 0 },
            ..BridgeConfig::default()
        };
        assert!(matches!(validate(&config), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_default_registers_come_from_builtin_table() {
        let config = BridgeConfig::default();
        let map = config.register_map().unwrap();
        assert_eq!(map.len(), standard_registers().len());
    }
}
