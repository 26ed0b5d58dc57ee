//! # pzem-rs - PZEM-004T Power Meter Monitor
//!
//! The pzem-rs crate polls a PZEM-004T energy meter over Modbus RTU, keeps the
//! serial link alive through a failure-counting supervisor, and drives a small
//! character LCD whose backlight follows a wake/duty-cycle state machine.
//!
//! ## Features
//!
//! - Build and validate Modbus RTU "read input registers" frames (CRC-16/MODBUS)
//! - Decode the ten measurement registers into volts, amps, watts, watt-hours,
//!   hertz and power factor
//! - Disable the link after repeated failures and reopen it after a settle delay
//! - Schedule the display backlight between wake windows and an on/off duty cycle
//! - Reset the meter's energy counter
//! - Run everything from one cooperative loop with a liveness watchdog
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pzem_rs::{MeterReader, SerialConfig, SerialTransport};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), pzem_rs::MeterError> {
//! let transport = SerialTransport::open(SerialConfig::default())?;
//! let mut meter = MeterReader::new(transport, 0x01, Duration::from_millis(100));
//! let reading = meter.poll().await;
//! if reading.valid {
//!     println!("{:.1} V, {:.1} W", reading.voltage, reading.active_power);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod display;
pub mod error;
pub mod logging;
pub mod meter;
pub mod modbus;
pub mod runtime;
pub mod supervisor;
pub mod util;

pub use crate::config::MonitorConfig;
pub use crate::error::{ConfigError, DisplayError, FrameError, MeterError};
pub use crate::logging::{init_logger, init_logger_with_level};

pub use display::{
    ConsoleDisplay, DisplayLayout, DisplayScheduler, DisplaySink, DisplayState, DisplayTiming,
    RecordingDisplay, WakeTrigger,
};
pub use meter::{MeterReader, Reading};
pub use modbus::{MockReply, MockTransport, SerialConfig, SerialTransport, Transport};
pub use runtime::{LoopTiming, MonitorLoop, SoftwareWatchdog, Watchdog};
pub use supervisor::{LinkHealth, LinkPolicy, LinkSupervisor, Recovery};
