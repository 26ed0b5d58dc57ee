//! # Hex Encoding/Decoding Utilities
//!
//! Hex helpers used for frame dumps in debug logs and for writing Modbus
//! test frames as readable strings.
//!
//! ```rust
//! use pzem_rs::util::hex::{decode_hex, format_hex_compact};
//!
//! let frame = decode_hex("01 04 00 00 00 0A 70 0D").unwrap();
//! assert_eq!(format_hex_compact(&frame[..2]), "01 04");
//! ```

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Decode hex string to bytes
///
/// Accepts both uppercase and lowercase hex characters.
/// Whitespace is automatically stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Format hex data for compact display (useful for logs)
///
/// Formats data as "01 04 14 08" with spaces between bytes.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Helper for creating test data from hex strings
///
/// Panics on invalid hex (intended for test code only).
pub fn hex_to_bytes(hex: &str) -> Vec<u8> {
    decode_hex(hex).expect("Invalid hex in test data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_request_frame() {
        assert_eq!(
            decode_hex("01040000000a700d").unwrap(),
            vec![0x01, 0x04, 0x00, 0x00, 0x00, 0x0A, 0x70, 0x0D]
        );
    }

    #[test]
    fn test_decode_with_whitespace() {
        assert_eq!(decode_hex("01 04 14").unwrap(), vec![0x01, 0x04, 0x14]);
    }

    #[test]
    fn test_format_compact() {
        assert_eq!(format_hex_compact(&[0x01, 0x84, 0x02]), "01 84 02");
    }

    #[test]
    fn test_errors() {
        assert_eq!(decode_hex(""), Err(HexError::EmptyString));
        assert_eq!(decode_hex("1"), Err(HexError::OddLength(1)));
        assert!(matches!(decode_hex("GG"), Err(HexError::DecodeError(_))));
    }
}
