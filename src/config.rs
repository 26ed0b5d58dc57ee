//! Configuration for the monitor.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Durations are plain millisecond counts.
//!
//! ```json
//! {
//!   "serial": { "port": "/dev/ttyUSB0", "baudrate": 9600 },
//!   "device_address": 1,
//!   "poll_interval_ms": 10000,
//!   "display": { "layout": "lcd16x2", "off_ms": 45000 }
//! }
//! ```

use crate::constants::*;
use crate::display::layout::DisplayLayout;
use crate::display::scheduler::DisplayTiming;
use crate::error::ConfigError;
use crate::modbus::transport::SerialConfig;
use crate::runtime::LoopTiming;
use crate::supervisor::LinkPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub serial: SerialSection,
    /// Modbus slave address of the meter (1-247)
    pub device_address: u8,
    pub poll_interval_ms: u64,
    pub failure_threshold: u32,
    pub settle_delay_ms: u64,
    pub display: DisplaySection,
    pub loop_tick_ms: u64,
    pub housekeeping_ms: u64,
    /// 0 disables the watchdog
    pub watchdog_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    pub port: String,
    pub baudrate: u32,
    pub response_wait_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    pub layout: DisplayLayout,
    pub wake_ms: u64,
    pub on_ms: u64,
    pub off_ms: u64,
    pub refresh_ms: u64,
    pub duty_cycle: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            serial: SerialSection::default(),
            device_address: PZEM_DEFAULT_ADDRESS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            display: DisplaySection::default(),
            loop_tick_ms: DEFAULT_LOOP_TICK_MS,
            housekeeping_ms: DEFAULT_HOUSEKEEPING_MS,
            watchdog_ms: DEFAULT_WATCHDOG_MS,
        }
    }
}

impl Default for SerialSection {
    fn default() -> Self {
        let serial = SerialConfig::default();
        SerialSection {
            port: serial.port,
            baudrate: serial.baudrate,
            response_wait_ms: DEFAULT_RESPONSE_WAIT_MS,
        }
    }
}

impl Default for DisplaySection {
    fn default() -> Self {
        DisplaySection {
            layout: DisplayLayout::default(),
            wake_ms: DEFAULT_WAKE_MS,
            on_ms: DEFAULT_DUTY_ON_MS,
            off_ms: DEFAULT_DUTY_OFF_MS,
            refresh_ms: DEFAULT_REFRESH_MS,
            duty_cycle: true,
        }
    }
}

impl MonitorConfig {
    /// Reads, parses and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: MonitorConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MODBUS_ADDRESS_MIN..=MODBUS_ADDRESS_MAX).contains(&self.device_address) {
            return Err(ConfigError::Validation(format!(
                "device_address {} outside {MODBUS_ADDRESS_MIN}..={MODBUS_ADDRESS_MAX}",
                self.device_address
            )));
        }
        if self.serial.port.is_empty() {
            return Err(ConfigError::Validation("serial.port is empty".into()));
        }
        if self.serial.baudrate == 0 {
            return Err(ConfigError::Validation("serial.baudrate must be > 0".into()));
        }
        if self.serial.response_wait_ms == 0 {
            return Err(ConfigError::Validation(
                "serial.response_wait_ms must be > 0".into(),
            ));
        }
        if self.poll_interval_ms < self.serial.response_wait_ms {
            return Err(ConfigError::Validation(format!(
                "poll_interval_ms {} shorter than response wait {}",
                self.poll_interval_ms, self.serial.response_wait_ms
            )));
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::Validation("failure_threshold must be >= 1".into()));
        }
        for (name, value) in [
            ("display.wake_ms", self.display.wake_ms),
            ("display.on_ms", self.display.on_ms),
            ("display.off_ms", self.display.off_ms),
            ("display.refresh_ms", self.display.refresh_ms),
            ("loop_tick_ms", self.loop_tick_ms),
            ("housekeeping_ms", self.housekeeping_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            port: self.serial.port.clone(),
            baudrate: self.serial.baudrate,
        }
    }

    pub fn response_wait(&self) -> Duration {
        Duration::from_millis(self.serial.response_wait_ms)
    }

    pub fn link_policy(&self) -> LinkPolicy {
        LinkPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            failure_threshold: self.failure_threshold,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    pub fn display_timing(&self) -> DisplayTiming {
        DisplayTiming {
            wake: Duration::from_millis(self.display.wake_ms),
            on: Duration::from_millis(self.display.on_ms),
            off: Duration::from_millis(self.display.off_ms),
            duty_cycle: self.display.duty_cycle,
        }
    }

    pub fn loop_timing(&self) -> LoopTiming {
        LoopTiming {
            tick: Duration::from_millis(self.loop_tick_ms),
            refresh: Duration::from_millis(self.display.refresh_ms),
            housekeeping: Duration::from_millis(self.housekeeping_ms),
        }
    }

    pub fn watchdog_timeout(&self) -> Option<Duration> {
        (self.watchdog_ms > 0).then(|| Duration::from_millis(self.watchdog_ms))
    }
}
