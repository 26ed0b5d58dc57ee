//! # PZEM Meter Reader
//!
//! One "read all" transaction per poll: ten input registers starting at 0,
//! decoded from fixed point into physical units.
//!
//! | Register | Quantity | Scale |
//! |----------|----------|-------|
//! | 0        | voltage (V) | /10 |
//! | 1, 2     | current (A), low word first | /1000 |
//! | 3, 4     | active power (W), low word first | /10 |
//! | 5, 6     | energy (Wh), low word first | /1000 |
//! | 7        | frequency (Hz) | /10 |
//! | 8        | power factor | /100 |
//! | 9        | alarm status (not surfaced) | |
//!
//! The reader never retries and never caches: every call is a fresh
//! transaction, and any failure yields an invalid [`Reading`] with all
//! fields cleared.

use crate::constants::*;
use crate::error::MeterError;
use crate::modbus::frame::{
    build_read_request, build_reset_energy_request, parse_reset_energy_response, parse_response,
};
use crate::modbus::transport::{exchange, Transport};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// One decoded measurement set.
///
/// `valid == false` means "no current data": every measurement is zero and
/// none is carried over from an earlier poll.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    pub voltage: f64,
    pub current: f64,
    pub active_power: f64,
    pub energy: f64,
    pub frequency: f64,
    pub power_factor: f64,
    pub valid: bool,
}

impl Reading {
    /// The "no data" reading.
    pub fn invalid() -> Self {
        Reading::default()
    }

    /// Decodes the ten "read all" registers. Anything but exactly ten words
    /// is rejected.
    pub fn from_registers(words: &[u16]) -> Result<Self, MeterError> {
        if words.len() != PZEM_READ_ALL_COUNT as usize {
            return Err(MeterError::UnexpectedRegisterCount {
                expected: PZEM_READ_ALL_COUNT as usize,
                actual: words.len(),
            });
        }

        let pair = |low: usize, high: usize| words[low] as u32 | (words[high] as u32) << 16;

        Ok(Reading {
            voltage: words[PZEM_REG_VOLTAGE] as f64 / PZEM_VOLTAGE_DIVISOR,
            current: pair(PZEM_REG_CURRENT_LOW, PZEM_REG_CURRENT_HIGH) as f64 / PZEM_CURRENT_DIVISOR,
            active_power: pair(PZEM_REG_POWER_LOW, PZEM_REG_POWER_HIGH) as f64 / PZEM_POWER_DIVISOR,
            energy: pair(PZEM_REG_ENERGY_LOW, PZEM_REG_ENERGY_HIGH) as f64 / PZEM_ENERGY_DIVISOR,
            frequency: words[PZEM_REG_FREQUENCY] as f64 / PZEM_FREQUENCY_DIVISOR,
            power_factor: words[PZEM_REG_POWER_FACTOR] as f64 / PZEM_POWER_FACTOR_DIVISOR,
            valid: true,
        })
    }
}

// Invalid readings serialise their measurements as null so a consumer cannot
// mistake the cleared zeros for real values.
impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let value = |v: f64| if self.valid { Some(v) } else { None };
        let mut s = serializer.serialize_struct("Reading", 7)?;
        s.serialize_field("voltage", &value(self.voltage))?;
        s.serialize_field("current", &value(self.current))?;
        s.serialize_field("power", &value(self.active_power))?;
        s.serialize_field("energy", &value(self.energy))?;
        s.serialize_field("frequency", &value(self.frequency))?;
        s.serialize_field("pf", &value(self.power_factor))?;
        s.serialize_field("valid", &self.valid)?;
        s.end()
    }
}

/// Issues "read all" transactions against one meter.
///
/// The reader owns the transport exclusively; nothing else touches the bus.
pub struct MeterReader<T: Transport> {
    transport: T,
    device_address: u8,
    response_wait: Duration,
}

impl<T: Transport> MeterReader<T> {
    pub fn new(transport: T, device_address: u8, response_wait: Duration) -> Self {
        MeterReader {
            transport,
            device_address,
            response_wait,
        }
    }

    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    /// One transaction; failures come back as an invalid reading.
    pub async fn poll(&mut self) -> Reading {
        match self.try_poll().await {
            Ok(reading) => reading,
            Err(e) => {
                log::debug!(target: "pzem::link", "poll failed: {e}");
                Reading::invalid()
            }
        }
    }

    /// One transaction, with the failure reason kept.
    pub async fn try_poll(&mut self) -> Result<Reading, MeterError> {
        let request = build_read_request(
            self.device_address,
            PZEM_READ_ALL_START,
            PZEM_READ_ALL_COUNT,
        )?;
        let raw = exchange(&mut self.transport, &request, self.response_wait).await?;
        let words = parse_response(&raw, self.device_address)?;
        Reading::from_registers(&words)
    }

    /// Resets the meter's energy counter to zero.
    pub async fn reset_energy(&mut self) -> Result<(), MeterError> {
        let request = build_reset_energy_request(self.device_address);
        let raw = exchange(&mut self.transport, &request, self.response_wait).await?;
        parse_reset_energy_response(&raw, self.device_address)?;
        log::info!(target: "pzem::link", "energy counter reset on 0x{:02X}", self.device_address);
        Ok(())
    }

    /// Closes and reopens the bus link.
    pub async fn reinitialize(&mut self) -> Result<(), MeterError> {
        self.transport.reopen().await
    }
}
