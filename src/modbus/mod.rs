//! The modbus module contains the Modbus RTU client pieces: frame building and
//! validation, and the serial transport the frames travel over.

pub mod frame;
pub mod mock;
pub mod transport;

pub use frame::{
    build_read_request, build_reset_energy_request, checksum16, parse_reset_energy_response,
    parse_response, verify_checksum, BusFrame, RegisterWords,
};
pub use mock::{MockReply, MockTransport};
pub use transport::{exchange, SerialConfig, SerialTransport, Transport};
