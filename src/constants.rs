//! PZEM / Modbus RTU Protocol Constants
//!
//! This module defines the constants used by the Modbus RTU client and the
//! PZEM-004T register map, together with the default timings of the monitor.

// ----------------------------------------------------------------------------
// Modbus RTU framing
// ----------------------------------------------------------------------------

/// Read input registers
pub const MODBUS_FUNCTION_READ_INPUT: u8 = 0x04;

/// PZEM vendor function: reset energy counter
pub const MODBUS_FUNCTION_RESET_ENERGY: u8 = 0x42;

/// High bit set on the function code of an exception response
pub const MODBUS_EXCEPTION_MASK: u8 = 0x80;

/// CRC-16/MODBUS reflected polynomial
pub const MODBUS_CRC_POLY: u16 = 0xA001;

/// CRC-16/MODBUS seed
pub const MODBUS_CRC_SEED: u16 = 0xFFFF;

/// Smallest well-formed response: address, function, one byte, CRC
pub const MODBUS_MIN_RESPONSE_LEN: usize = 5;

/// Address + function + byte count
pub const MODBUS_RESPONSE_HEADER_LEN: usize = 3;

/// Trailing CRC bytes
pub const MODBUS_CRC_LEN: usize = 2;

/// Lowest and highest unicast slave address
pub const MODBUS_ADDRESS_MIN: u8 = 0x01;
pub const MODBUS_ADDRESS_MAX: u8 = 0xF7;

// ----------------------------------------------------------------------------
// PZEM-004T register map (input registers)
// ----------------------------------------------------------------------------

pub const PZEM_DEFAULT_ADDRESS: u8 = 0x01;

/// Largest block the meter answers in one read
pub const PZEM_MAX_READ_REGISTERS: u16 = 10;

/// "Read all" starts at register 0 and covers the whole block
pub const PZEM_READ_ALL_START: u16 = 0x0000;
pub const PZEM_READ_ALL_COUNT: u16 = 10;

pub const PZEM_REG_VOLTAGE: usize = 0;
pub const PZEM_REG_CURRENT_LOW: usize = 1;
pub const PZEM_REG_CURRENT_HIGH: usize = 2;
pub const PZEM_REG_POWER_LOW: usize = 3;
pub const PZEM_REG_POWER_HIGH: usize = 4;
pub const PZEM_REG_ENERGY_LOW: usize = 5;
pub const PZEM_REG_ENERGY_HIGH: usize = 6;
pub const PZEM_REG_FREQUENCY: usize = 7;
pub const PZEM_REG_POWER_FACTOR: usize = 8;
pub const PZEM_REG_ALARM: usize = 9;

// Fixed-point divisors
pub const PZEM_VOLTAGE_DIVISOR: f64 = 10.0;
pub const PZEM_CURRENT_DIVISOR: f64 = 1000.0;
pub const PZEM_POWER_DIVISOR: f64 = 10.0;
/// Energy scale is fixed at /1000; see DESIGN.md for why /100 was rejected.
pub const PZEM_ENERGY_DIVISOR: f64 = 1000.0;
pub const PZEM_FREQUENCY_DIVISOR: f64 = 10.0;
pub const PZEM_POWER_FACTOR_DIVISOR: f64 = 100.0;

// ----------------------------------------------------------------------------
// Default timings (milliseconds)
// ----------------------------------------------------------------------------

pub const DEFAULT_BAUDRATE: u32 = 9600;
pub const DEFAULT_RESPONSE_WAIT_MS: u64 = 100;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

pub const DEFAULT_WAKE_MS: u64 = 20_000;
pub const DEFAULT_DUTY_ON_MS: u64 = 20_000;
pub const DEFAULT_DUTY_OFF_MS: u64 = 45_000;
pub const DEFAULT_REFRESH_MS: u64 = 5_000;

pub const DEFAULT_LOOP_TICK_MS: u64 = 50;
pub const DEFAULT_HOUSEKEEPING_MS: u64 = 60_000;
pub const DEFAULT_WATCHDOG_MS: u64 = 30_000;

// ----------------------------------------------------------------------------
// Character display geometry
// ----------------------------------------------------------------------------

pub const LCD_16X2_COLUMNS: usize = 16;
pub const LCD_16X2_ROWS: u8 = 2;
pub const LCD_20X4_COLUMNS: usize = 20;
pub const LCD_20X4_ROWS: u8 = 4;
