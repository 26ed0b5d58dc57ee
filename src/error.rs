//! # Error Handling
//!
//! This module defines the error types of the pzem-rs crate. Frame and
//! transport errors never escape the polling path: the reader and the link
//! supervisor fold them into an invalid [`crate::meter::Reading`] and the
//! [`crate::supervisor::LinkHealth`] counters.

use std::time::Duration;
use thiserror::Error;

/// Reasons a Modbus RTU frame is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Response is too short, or its payload cannot be split into words.
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// Response came from a different slave.
    #[error("Address mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    AddressMismatch { expected: u8, actual: u8 },

    /// Device answered with an exception (function code high bit set).
    #[error("Exception response: function 0x{function:02X}, code 0x{code:02X}")]
    ExceptionResponse { function: u8, code: u8 },

    /// Function code is not the one requested.
    #[error("Function mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    FunctionMismatch { expected: u8, actual: u8 },

    /// Declared byte count does not fit in the received bytes.
    #[error("Length mismatch: need {needed} bytes, got {actual}")]
    LengthMismatch { needed: usize, actual: usize },

    /// Trailing CRC does not match the recomputed one.
    #[error("Invalid checksum: expected {expected:04X}, calculated {calculated:04X}")]
    ChecksumMismatch { expected: u16, calculated: u16 },

    /// Request asked for zero registers or more than the meter serves.
    #[error("Register count {count} out of range (1..={max})")]
    RegisterCountOutOfRange { count: u16, max: u16 },
}

/// Errors from one meter transaction.
#[derive(Debug, Error)]
pub enum MeterError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Serial write/read/open failure.
    #[error("Serial port error: {0}")]
    Transport(String),

    /// Nothing (or not enough) arrived within the wait window.
    #[error("No response within {waited:?}")]
    Timeout { waited: Duration },

    #[error("Expected {expected} registers, got {actual}")]
    UnexpectedRegisterCount { expected: usize, actual: usize },
}

impl From<std::io::Error> for MeterError {
    fn from(err: std::io::Error) -> Self {
        MeterError::Transport(err.to_string())
    }
}

impl From<tokio_serial::Error> for MeterError {
    fn from(err: tokio_serial::Error) -> Self {
        MeterError::Transport(err.to_string())
    }
}

/// Failures of the character display capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DisplayError {
    #[error("Row {row} out of range (display has {rows} rows)")]
    RowOutOfRange { row: u8, rows: u8 },

    #[error("Display bus error: {0}")]
    Bus(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
