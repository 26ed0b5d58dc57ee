#![no_main]

use libfuzzer_sys::fuzz_target;
use pzem_rs::modbus::frame::{expected_response_len, parse_reset_energy_response, parse_response};

fuzz_target!(|data: &[u8]| {
    let address = data.first().copied().unwrap_or(0x01);
    let _ = expected_response_len(data);
    let _ = parse_response(data, address);
    let _ = parse_reset_energy_response(data, address);
});
