//! End-to-end monitor loop scenarios on paused tokio time.

use pzem_rs::display::DisplayOp;
use pzem_rs::modbus::frame::append_checksum;
use pzem_rs::{
    DisplayLayout, DisplayScheduler, DisplayState, DisplayTiming, LinkPolicy, LinkSupervisor,
    LoopTiming, MeterReader, MockReply, MockTransport, MonitorLoop, RecordingDisplay, Recovery,
};
use std::time::Duration;
use tokio::time::Instant;

fn healthy() -> Vec<u8> {
    let mut frame = vec![0x01, 0x04, 0x14];
    for word in [2300u16, 1500, 0, 2500, 0, 1000, 0, 500, 95, 0] {
        frame.extend_from_slice(&word.to_be_bytes());
    }
    append_checksum(&mut frame);
    frame
}

fn monitor(
    mock: &MockTransport,
    t0: Instant,
) -> (MonitorLoop<MockTransport, RecordingDisplay>, RecordingDisplay) {
    let reader = MeterReader::new(mock.clone(), 0x01, Duration::from_millis(100));
    let link = LinkSupervisor::new(
        reader,
        LinkPolicy {
            poll_interval: Duration::from_secs(10),
            failure_threshold: 3,
            settle_delay: Duration::from_millis(500),
        },
    );
    let lcd = RecordingDisplay::new();
    let display =
        DisplayScheduler::new(lcd.clone(), DisplayLayout::Lcd16x2, DisplayTiming::default(), t0);
    (MonitorLoop::new(link, display, LoopTiming::default(), t0), lcd)
}

#[tokio::test(start_paused = true)]
async fn test_dead_bus_disables_then_recovers() {
    let mock = MockTransport::new();
    let t0 = Instant::now();
    let (mut monitor, _) = monitor(&mock, t0);

    for i in 0..3u64 {
        monitor.run_iteration(t0 + Duration::from_secs(10 * i)).await;
    }
    assert!(!monitor.link().health().enabled);
    let failed_at = t0 + Duration::from_secs(20);

    // Re-init waits for the settle delay, then the next scheduled poll succeeds
    let report = monitor.run_iteration(failed_at + Duration::from_millis(450)).await;
    assert_eq!(report.recovery, None);
    let report = monitor.run_iteration(failed_at + Duration::from_millis(500)).await;
    assert_eq!(report.recovery, Some(Recovery::Restored));

    mock.queue_reply(MockReply::Frame(healthy()));
    let report = monitor.run_iteration(failed_at + Duration::from_secs(10)).await;
    assert!(report.reading.unwrap().valid);
    assert_eq!(monitor.link().health().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_display_traffic_while_dark() {
    let mock = MockTransport::answering(healthy());
    let t0 = Instant::now();
    let (mut monitor, lcd) = monitor(&mock, t0);

    monitor.run_iteration(t0).await;
    monitor.run_iteration(t0 + Duration::from_secs(20)).await;
    assert_eq!(monitor.display().state(), DisplayState::DutyOff { since: t0 + Duration::from_secs(20) });
    lcd.take_ops();

    // Poll at 30 s happens with the display dark
    let report = monitor.run_iteration(t0 + Duration::from_secs(30)).await;
    assert!(report.reading.is_some());
    assert!(lcd.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_external_wake_served_between_polls() {
    let mock = MockTransport::answering(healthy());
    let t0 = Instant::now();
    let (mut monitor, lcd) = monitor(&mock, t0);
    monitor.run_iteration(t0).await;
    monitor.run_iteration(t0 + Duration::from_secs(20)).await;
    lcd.take_ops();

    let trigger = monitor.wake_trigger();
    trigger.wake();
    let at = t0 + Duration::from_secs(22);
    let report = monitor.run_iteration(at).await;
    assert!(report.reading.is_none());
    assert_eq!(report.transition.unwrap().to, DisplayState::WakeActive { started_at: at });
    assert!(lcd.ops().contains(&DisplayOp::Write(0, "230.0V  1.50A".into())));
}

#[tokio::test(start_paused = true)]
async fn test_housekeeping_interval() {
    let mock = MockTransport::answering(healthy());
    let t0 = Instant::now();
    let (mut monitor, _) = monitor(&mock, t0);

    assert!(!monitor.run_iteration(t0 + Duration::from_secs(59)).await.housekeeping);
    assert!(monitor.run_iteration(t0 + Duration::from_secs(60)).await.housekeeping);
    assert!(!monitor.run_iteration(t0 + Duration::from_secs(61)).await.housekeeping);
}

#[tokio::test(start_paused = true)]
async fn test_iteration_bounded_by_wait_window() {
    let mock = MockTransport::new();
    let t0 = Instant::now();
    let (mut monitor, _) = monitor(&mock, t0);

    let started = Instant::now();
    monitor.run_iteration(t0).await;
    assert!(started.elapsed() <= Duration::from_millis(101));
}
