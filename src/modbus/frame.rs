//! # Modbus RTU Frame Codec
//!
//! This module builds and validates the Modbus RTU frames exchanged with the
//! PZEM meter. Only two functions are spoken: "read input registers" (0x04)
//! and the vendor "reset energy" command (0x42).
//!
//! ## Frame layout
//!
//! ```text
//! request:   addr | 0x04 | start_hi | start_lo | count_hi | count_lo | crc_lo | crc_hi
//! response:  addr | 0x04 | byte_count | data[byte_count] | crc_lo | crc_hi
//! exception: addr | 0x84 | code | crc_lo | crc_hi
//! ```
//!
//! The CRC is CRC-16/MODBUS (reflected polynomial 0xA001, seed 0xFFFF),
//! appended low byte first. It detects every single-bit error; two distinct
//! multi-bit corruptions can still collide, which is the usual limitation of
//! a 16-bit check and is not treated as a bug here.
//!
//! ## Usage
//!
//! ```rust
//! use pzem_rs::modbus::frame::{build_read_request, parse_response};
//!
//! let request = build_read_request(0x01, 0x0000, 10).unwrap();
//! assert_eq!(request, [0x01, 0x04, 0x00, 0x00, 0x00, 0x0A, 0x70, 0x0D]);
//!
//! let response = [0x01, 0x04, 0x02, 0x08, 0xFC, 0xBE, 0xB1];
//! assert_eq!(parse_response(&response, 0x01).unwrap(), vec![2300]);
//! ```

use crate::constants::{
    MODBUS_CRC_LEN, MODBUS_CRC_POLY, MODBUS_CRC_SEED, MODBUS_EXCEPTION_MASK,
    MODBUS_FUNCTION_READ_INPUT, MODBUS_FUNCTION_RESET_ENERGY, MODBUS_MIN_RESPONSE_LEN,
    MODBUS_RESPONSE_HEADER_LEN, PZEM_MAX_READ_REGISTERS,
};
use crate::error::FrameError;
use nom::multi::count;
use nom::number::complete::be_u16;
use nom::IResult;

/// Register words decoded from a response, in wire order.
pub type RegisterWords = Vec<u16>;

/// One Modbus RTU frame.
///
/// `checksum` always covers `device_address`, `function_code` and `payload`;
/// the constructors compute it so a `BusFrame` is valid by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusFrame {
    pub device_address: u8,
    pub function_code: u8,
    pub payload: Vec<u8>,
    pub checksum: u16,
}

impl BusFrame {
    /// Creates a frame and computes its checksum.
    pub fn new(device_address: u8, function_code: u8, payload: Vec<u8>) -> Self {
        let mut frame = BusFrame {
            device_address,
            function_code,
            payload,
            checksum: 0,
        };
        frame.checksum = checksum16(&frame.header_and_payload());
        frame
    }

    /// "Read input registers" request for `register_count` registers at `start_address`.
    pub fn read_input_registers(
        device_address: u8,
        start_address: u16,
        register_count: u16,
    ) -> Result<Self, FrameError> {
        if register_count == 0 || register_count > PZEM_MAX_READ_REGISTERS {
            return Err(FrameError::RegisterCountOutOfRange {
                count: register_count,
                max: PZEM_MAX_READ_REGISTERS,
            });
        }

        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&start_address.to_be_bytes());
        payload.extend_from_slice(&register_count.to_be_bytes());
        Ok(Self::new(device_address, MODBUS_FUNCTION_READ_INPUT, payload))
    }

    /// Vendor "reset energy counter" request (no payload).
    pub fn reset_energy(device_address: u8) -> Self {
        Self::new(device_address, MODBUS_FUNCTION_RESET_ENERGY, Vec::new())
    }

    /// Recomputes the checksum and compares it with the stored one.
    pub fn verify(&self) -> Result<(), FrameError> {
        let calculated = checksum16(&self.header_and_payload());
        if calculated != self.checksum {
            return Err(FrameError::ChecksumMismatch {
                expected: self.checksum,
                calculated,
            });
        }
        Ok(())
    }

    /// Wire representation, checksum low byte first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = self.header_and_payload();
        data.extend_from_slice(&self.checksum.to_le_bytes());
        data
    }

    fn header_and_payload(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(2 + self.payload.len() + MODBUS_CRC_LEN);
        data.push(self.device_address);
        data.push(self.function_code);
        data.extend_from_slice(&self.payload);
        data
    }
}

/// CRC-16/MODBUS over `bytes`.
pub fn checksum16(bytes: &[u8]) -> u16 {
    let mut crc = MODBUS_CRC_SEED;

    for &byte in bytes {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ MODBUS_CRC_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// Appends the CRC of `bytes` to `bytes`, low byte first.
pub fn append_checksum(bytes: &mut Vec<u8>) {
    let crc = checksum16(bytes);
    bytes.extend_from_slice(&crc.to_le_bytes());
}

/// Checks that the trailing two bytes of `frame` are the CRC of everything before them.
pub fn verify_checksum(frame: &[u8]) -> Result<(), FrameError> {
    if frame.len() < MODBUS_CRC_LEN {
        return Err(FrameError::Malformed(format!(
            "{} bytes cannot carry a checksum",
            frame.len()
        )));
    }

    let (body, trailer) = frame.split_at(frame.len() - MODBUS_CRC_LEN);
    let expected = u16::from_le_bytes([trailer[0], trailer[1]]);
    let calculated = checksum16(body);
    if expected != calculated {
        return Err(FrameError::ChecksumMismatch {
            expected,
            calculated,
        });
    }
    Ok(())
}

/// Builds the 8-byte "read input registers" request.
pub fn build_read_request(
    device_id: u8,
    start_address: u16,
    register_count: u16,
) -> Result<Vec<u8>, FrameError> {
    BusFrame::read_input_registers(device_id, start_address, register_count)
        .map(|frame| frame.to_bytes())
}

/// Builds the 4-byte "reset energy" request.
pub fn build_reset_energy_request(device_id: u8) -> Vec<u8> {
    BusFrame::reset_energy(device_id).to_bytes()
}

/// Validates a "read input registers" response and returns its register words.
///
/// Checks run in a fixed order: length, address, exception marker, function
/// code, declared byte count, checksum. Bytes after the declared frame end
/// are ignored.
pub fn parse_response(raw: &[u8], expected_device_id: u8) -> Result<RegisterWords, FrameError> {
    check_header(raw, expected_device_id, MODBUS_FUNCTION_READ_INPUT)?;

    let byte_count = raw[2] as usize;
    let needed = MODBUS_RESPONSE_HEADER_LEN + byte_count + MODBUS_CRC_LEN;
    if needed > raw.len() {
        return Err(FrameError::LengthMismatch {
            needed,
            actual: raw.len(),
        });
    }

    verify_checksum(&raw[..needed])?;

    if byte_count % 2 != 0 {
        return Err(FrameError::Malformed(format!(
            "odd byte count {byte_count} cannot hold 16-bit registers"
        )));
    }

    let data = &raw[MODBUS_RESPONSE_HEADER_LEN..MODBUS_RESPONSE_HEADER_LEN + byte_count];
    let (_, words) = register_words(data, byte_count / 2)
        .map_err(|e| FrameError::Malformed(format!("{e:?}")))?;
    Ok(words)
}

/// Validates the echo the meter sends back after a reset-energy request.
pub fn parse_reset_energy_response(raw: &[u8], expected_device_id: u8) -> Result<(), FrameError> {
    // The echo is only 4 bytes, so the generic minimum does not apply.
    if raw.len() < 4 {
        return Err(FrameError::Malformed(format!(
            "reset echo needs 4 bytes, got {}",
            raw.len()
        )));
    }
    if raw[0] != expected_device_id {
        return Err(FrameError::AddressMismatch {
            expected: expected_device_id,
            actual: raw[0],
        });
    }
    if raw[1] & MODBUS_EXCEPTION_MASK != 0 {
        return Err(exception_from(raw));
    }
    if raw[1] != MODBUS_FUNCTION_RESET_ENERGY {
        return Err(FrameError::FunctionMismatch {
            expected: MODBUS_FUNCTION_RESET_ENERGY,
            actual: raw[1],
        });
    }
    verify_checksum(&raw[..4])
}

/// Total length of the frame that `partial` is the start of, once enough
/// header bytes have arrived to tell.
///
/// Used by the transport to stop reading as soon as a frame is complete
/// instead of always sitting out the whole wait window.
pub fn expected_response_len(partial: &[u8]) -> Option<usize> {
    match partial {
        [_, function, ..] if function & MODBUS_EXCEPTION_MASK != 0 => Some(MODBUS_MIN_RESPONSE_LEN),
        [_, function, ..] if *function == MODBUS_FUNCTION_RESET_ENERGY => Some(4),
        [_, _, byte_count, ..] => {
            Some(MODBUS_RESPONSE_HEADER_LEN + *byte_count as usize + MODBUS_CRC_LEN)
        }
        _ => None,
    }
}

fn check_header(raw: &[u8], expected_device_id: u8, function: u8) -> Result<(), FrameError> {
    if raw.len() < MODBUS_MIN_RESPONSE_LEN {
        return Err(FrameError::Malformed(format!(
            "response needs at least {MODBUS_MIN_RESPONSE_LEN} bytes, got {}",
            raw.len()
        )));
    }
    if raw[0] != expected_device_id {
        return Err(FrameError::AddressMismatch {
            expected: expected_device_id,
            actual: raw[0],
        });
    }
    if raw[1] & MODBUS_EXCEPTION_MASK != 0 {
        return Err(exception_from(raw));
    }
    if raw[1] != function {
        return Err(FrameError::FunctionMismatch {
            expected: function,
            actual: raw[1],
        });
    }
    Ok(())
}

fn exception_from(raw: &[u8]) -> FrameError {
    FrameError::ExceptionResponse {
        function: raw[1] & !MODBUS_EXCEPTION_MASK,
        code: raw[2],
    }
}

fn register_words(data: &[u8], words: usize) -> IResult<&[u8], Vec<u16>> {
    count(be_u16, words)(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_check_value() {
        // CRC-16/MODBUS catalogue check value
        assert_eq!(checksum16(b"123456789"), 0x4B37);
        assert_eq!(checksum16(&[]), 0xFFFF);
    }

    #[test]
    fn test_frame_checksum_covers_header_and_payload() {
        let frame = BusFrame::read_input_registers(0x01, 0x0000, 10).unwrap();
        assert_eq!(frame.checksum, 0x0D70);
        assert!(frame.verify().is_ok());

        let mut tampered = frame.clone();
        tampered.payload[3] = 0x09;
        assert!(matches!(
            tampered.verify(),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_reset_energy_request() {
        assert_eq!(build_reset_energy_request(0x01), vec![0x01, 0x42, 0x80, 0x11]);
    }

    #[test]
    fn test_register_count_bounds() {
        assert_eq!(
            build_read_request(0x01, 0, 0),
            Err(FrameError::RegisterCountOutOfRange { count: 0, max: 10 })
        );
        assert_eq!(
            build_read_request(0x01, 0, 11),
            Err(FrameError::RegisterCountOutOfRange { count: 11, max: 10 })
        );
        assert!(build_read_request(0x01, 0, 1).is_ok());
    }

    #[test]
    fn test_expected_response_len() {
        assert_eq!(expected_response_len(&[0x01]), None);
        assert_eq!(expected_response_len(&[0x01, 0x84]), Some(5));
        assert_eq!(expected_response_len(&[0x01, 0x42]), Some(4));
        assert_eq!(expected_response_len(&[0x01, 0x04]), None);
        assert_eq!(expected_response_len(&[0x01, 0x04, 0x14]), Some(25));
    }

    #[test]
    fn test_odd_byte_count_is_malformed() {
        let mut raw = vec![0x01, 0x04, 0x01, 0xAA];
        append_checksum(&mut raw);
        assert!(matches!(
            parse_response(&raw, 0x01),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn test_trailing_garbage_ignored() {
        let mut raw = vec![0x01, 0x04, 0x02, 0x08, 0xFC];
        append_checksum(&mut raw);
        raw.extend_from_slice(&[0x00, 0xFF]);
        assert_eq!(parse_response(&raw, 0x01).unwrap(), vec![2300]);
    }

    #[test]
    fn test_reset_energy_response() {
        assert!(parse_reset_energy_response(&[0x01, 0x42, 0x80, 0x11], 0x01).is_ok());
        assert_eq!(
            parse_reset_energy_response(&[0x01, 0xC2, 0x01, 0xB0, 0xA0], 0x01),
            Err(FrameError::ExceptionResponse {
                function: 0x42,
                code: 0x01
            })
        );
        assert!(matches!(
            parse_reset_energy_response(&[0x01, 0x42], 0x01),
            Err(FrameError::Malformed(_))
        ));
    }
}
