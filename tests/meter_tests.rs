//! Meter reader tests against the scripted mock transport.

use pzem_rs::modbus::frame::append_checksum;
use pzem_rs::{MeterError, MeterReader, MockReply, MockTransport, Reading};
use std::time::Duration;
use tokio::time::Instant;

const WAIT: Duration = Duration::from_millis(100);

fn response(address: u8, words: &[u16]) -> Vec<u8> {
    let mut frame = vec![address, 0x04, (words.len() * 2) as u8];
    for word in words {
        frame.extend_from_slice(&word.to_be_bytes());
    }
    append_checksum(&mut frame);
    frame
}

fn sample() -> Vec<u8> {
    response(0x01, &[2300, 1500, 0, 2500, 0, 1000, 0, 500, 95, 0])
}

#[tokio::test(start_paused = true)]
async fn test_poll_decodes_reading() {
    let mock = MockTransport::answering(sample());
    let mut meter = MeterReader::new(mock.clone(), 0x01, WAIT);

    let reading = meter.poll().await;
    assert!(reading.valid);
    assert!((reading.voltage - 230.0).abs() < 1e-9);
    assert!((reading.current - 1.5).abs() < 1e-9);
    assert!((reading.active_power - 250.0).abs() < 1e-9);
    assert!((reading.energy - 1.0).abs() < 1e-9);
    assert!((reading.frequency - 50.0).abs() < 1e-9);
    assert!((reading.power_factor - 0.95).abs() < 1e-9);

    assert_eq!(
        mock.requests(),
        vec![vec![0x01, 0x04, 0x00, 0x00, 0x00, 0x0A, 0x70, 0x0D]]
    );
}

#[tokio::test(start_paused = true)]
async fn test_identical_responses_decode_identically() {
    let mock = MockTransport::answering(sample());
    let mut meter = MeterReader::new(mock, 0x01, WAIT);
    assert_eq!(meter.poll().await, meter.poll().await);
}

#[tokio::test(start_paused = true)]
async fn test_silent_bus_is_bounded_and_invalid() {
    let mock = MockTransport::new();
    let mut meter = MeterReader::new(mock, 0x01, WAIT);

    let started = Instant::now();
    let first = meter.poll().await;
    assert!(started.elapsed() <= WAIT + Duration::from_millis(1));
    assert_eq!(first, Reading::invalid());

    // No stale values carried over
    assert_eq!(meter.poll().await, first);
    assert!(matches!(
        meter.try_poll().await,
        Err(MeterError::Timeout { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failure_after_success_clears_values() {
    let mock = MockTransport::answering(sample());
    let mut meter = MeterReader::new(mock.clone(), 0x01, WAIT);
    assert!(meter.poll().await.valid);

    mock.queue_reply(MockReply::Silence);
    let reading = meter.poll().await;
    assert!(!reading.valid);
    assert_eq!(reading.voltage, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_bytes_are_discarded() {
    let mock = MockTransport::answering(sample());
    mock.inject_stale(&[0xDE, 0xAD, 0xBE, 0xEF]);
    let mut meter = MeterReader::new(mock, 0x01, WAIT);
    assert!(meter.poll().await.valid);
}

#[tokio::test(start_paused = true)]
async fn test_wrong_address_reply_rejected() {
    let mock = MockTransport::new();
    mock.queue_reply(MockReply::Frame(response(0x02, &[0; 10])));
    let mut meter = MeterReader::new(mock, 0x01, WAIT);
    assert!(matches!(
        meter.try_poll().await,
        Err(MeterError::Frame(pzem_rs::FrameError::AddressMismatch { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_short_register_set_rejected() {
    let mock = MockTransport::new();
    mock.queue_reply(MockReply::Frame(response(0x01, &[2300, 1500])));
    let mut meter = MeterReader::new(mock, 0x01, WAIT);
    assert!(matches!(
        meter.try_poll().await,
        Err(MeterError::UnexpectedRegisterCount {
            expected: 10,
            actual: 2
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_reset_energy() {
    let mock = MockTransport::new();
    mock.queue_reply(MockReply::Frame(vec![0x01, 0x42, 0x80, 0x11]));
    let mut meter = MeterReader::new(mock.clone(), 0x01, WAIT);
    meter.reset_energy().await.unwrap();
    assert_eq!(mock.requests(), vec![vec![0x01, 0x42, 0x80, 0x11]]);

    mock.queue_reply(MockReply::Frame(vec![0x01, 0xC2, 0x01, 0xB0, 0xA0]));
    assert!(meter.reset_energy().await.is_err());
}

#[test]
fn test_reading_json() {
    let reading = Reading::from_registers(&[2300, 1500, 0, 2500, 0, 1000, 0, 500, 95, 0]).unwrap();
    let json = serde_json::to_value(reading).unwrap();
    assert_eq!(json["power"], 250.0);
    assert_eq!(json["valid"], true);

    let json = serde_json::to_value(Reading::invalid()).unwrap();
    assert!(json["energy"].is_null());
}
