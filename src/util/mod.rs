//! # Utility Modules
//!
//! Hex helpers for frame dumps and test vectors, plus the throttled logging
//! used while the meter link is down.

pub mod hex;
pub mod logging;

pub use hex::{decode_hex, format_hex_compact, hex_to_bytes};
pub use logging::{log_frame_hex, LogThrottle};
