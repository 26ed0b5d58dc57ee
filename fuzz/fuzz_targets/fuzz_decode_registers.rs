#![no_main]

use libfuzzer_sys::fuzz_target;
use pzem_rs::Reading;

fuzz_target!(|data: &[u8]| {
    let words: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    if let Ok(reading) = Reading::from_registers(&words) {
        assert!(reading.valid);
        assert!(reading.voltage >= 0.0 && reading.energy >= 0.0);
    }
});
