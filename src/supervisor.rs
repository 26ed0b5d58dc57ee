//! # Link Supervisor
//!
//! Owns the [`MeterReader`] and the [`LinkHealth`] record. Every poll outcome
//! lands in `LinkHealth`; nothing here returns an error.
//!
//! Recovery policy:
//!
//! 1. A successful read resets `consecutive_failures` to zero.
//! 2. A failed read increments it. On reaching the threshold the link is
//!    disabled and a re-initialisation is scheduled one settle delay later.
//! 3. While disabled, poll ticks do not read the meter.
//! 4. A due re-initialisation runs at the start of the next
//!    [`LinkSupervisor::tick`], or earlier through
//!    [`LinkSupervisor::service`]. Success re-enables the link and the same
//!    tick goes on to poll; failure schedules the next attempt one poll
//!    interval later.
//!
//! Scheduling the settle delay instead of sleeping through it keeps every
//! call bounded by the bus wait window.

use crate::meter::{MeterReader, Reading};
use crate::modbus::transport::Transport;
use crate::util::logging::LogThrottle;
use std::time::Duration;
use tokio::time::Instant;

/// Observable state of the meter link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkHealth {
    pub consecutive_failures: u32,
    pub enabled: bool,
    pub last_poll_time: Option<Instant>,
    pub total_polls: u64,
    pub total_failures: u64,
    pub restarts: u32,
    pub last_error: Option<String>,
}

impl Default for LinkHealth {
    fn default() -> Self {
        LinkHealth {
            consecutive_failures: 0,
            enabled: true,
            last_poll_time: None,
            total_polls: 0,
            total_failures: 0,
            restarts: 0,
            last_error: None,
        }
    }
}

/// Fixed policy parameters.
#[derive(Debug, Clone, Copy)]
pub struct LinkPolicy {
    pub poll_interval: Duration,
    pub failure_threshold: u32,
    pub settle_delay: Duration,
}

/// Result of a re-initialisation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Restored,
    StillDown,
}

pub struct LinkSupervisor<T: Transport> {
    reader: MeterReader<T>,
    policy: LinkPolicy,
    health: LinkHealth,
    latest: Reading,
    reinit_at: Option<Instant>,
    skip_log: LogThrottle,
}

impl<T: Transport> LinkSupervisor<T> {
    pub fn new(reader: MeterReader<T>, policy: LinkPolicy) -> Self {
        LinkSupervisor {
            reader,
            policy,
            health: LinkHealth::default(),
            latest: Reading::invalid(),
            reinit_at: None,
            skip_log: LogThrottle::new(60_000, 1),
        }
    }

    pub fn health(&self) -> &LinkHealth {
        &self.health
    }

    pub fn latest(&self) -> Reading {
        self.latest
    }

    pub fn policy(&self) -> &LinkPolicy {
        &self.policy
    }

    /// When the next re-initialisation attempt is due, if one is pending.
    pub fn reinit_due(&self) -> Option<Instant> {
        self.reinit_at
    }

    pub fn reader_mut(&mut self) -> &mut MeterReader<T> {
        &mut self.reader
    }

    /// One scheduled poll. Returns the reading just published.
    pub async fn tick(&mut self, now: Instant) -> Reading {
        self.service(now).await;
        self.health.last_poll_time = Some(now);

        if !self.health.enabled {
            if self.skip_log.allow() {
                log::warn!(target: "pzem::link", "link disabled, skipping poll");
            }
            self.latest = Reading::invalid();
            return self.latest;
        }

        self.health.total_polls += 1;
        self.latest = match self.reader.try_poll().await {
            Ok(reading) => {
                self.health.consecutive_failures = 0;
                self.health.last_error = None;
                log::debug!(
                    target: "pzem::link",
                    "poll ok voltage={:.1} current={:.3} power={:.1} energy={:.3} frequency={:.1} pf={:.2}",
                    reading.voltage,
                    reading.current,
                    reading.active_power,
                    reading.energy,
                    reading.frequency,
                    reading.power_factor
                );
                reading
            }
            Err(e) => {
                self.record_failure(now, e.to_string());
                Reading::invalid()
            }
        };
        self.latest
    }

    /// Runs a due re-initialisation. Cheap when nothing is pending.
    pub async fn service(&mut self, now: Instant) -> Option<Recovery> {
        let due = self.reinit_at?;
        if now < due {
            return None;
        }

        self.health.restarts += 1;
        match self.reader.reinitialize().await {
            Ok(()) => {
                self.health.enabled = true;
                self.health.consecutive_failures = 0;
                self.reinit_at = None;
                self.skip_log.reset();
                log::info!(target: "pzem::link", "link restored restarts={}", self.health.restarts);
                Some(Recovery::Restored)
            }
            Err(e) => {
                self.health.last_error = Some(e.to_string());
                self.reinit_at = Some(now + self.policy.poll_interval);
                log::warn!(
                    target: "pzem::link",
                    "re-init failed error=\"{e}\", retry in {:?}",
                    self.policy.poll_interval
                );
                Some(Recovery::StillDown)
            }
        }
    }

    fn record_failure(&mut self, now: Instant, error: String) {
        self.health.total_failures += 1;
        self.health.consecutive_failures =
            (self.health.consecutive_failures + 1).min(self.policy.failure_threshold);
        log::warn!(
            target: "pzem::link",
            "poll failed error=\"{error}\" failures={}/{}",
            self.health.consecutive_failures,
            self.policy.failure_threshold
        );
        self.health.last_error = Some(error);

        if self.health.consecutive_failures >= self.policy.failure_threshold {
            self.health.enabled = false;
            self.reinit_at = Some(now + self.policy.settle_delay);
            log::warn!(
                target: "pzem::link",
                "restart triggered, re-init in {:?}",
                self.policy.settle_delay
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::mock::{MockReply, MockTransport};

    fn policy() -> LinkPolicy {
        LinkPolicy {
            poll_interval: Duration::from_secs(10),
            failure_threshold: 3,
            settle_delay: Duration::from_millis(500),
        }
    }

    fn supervisor(mock: &MockTransport) -> LinkSupervisor<MockTransport> {
        let reader = MeterReader::new(mock.clone(), 0x01, Duration::from_millis(100));
        LinkSupervisor::new(reader, policy())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_counter_saturates_at_threshold() {
        let mock = MockTransport::new();
        let mut link = supervisor(&mock);
        let now = Instant::now();

        for _ in 0..3 {
            link.tick(now).await;
        }
        assert_eq!(link.health().consecutive_failures, 3);
        assert!(!link.health().enabled);
        assert_eq!(link.reinit_due(), Some(now + Duration::from_millis(500)));

        // Disabled ticks before the re-init is due neither read nor count
        link.tick(now + Duration::from_millis(499)).await;
        assert_eq!(link.health().consecutive_failures, 3);
        assert_eq!(mock.requests().len(), 3);
        assert_eq!(mock.reopen_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_runs_due_reinit_then_polls() {
        let mock = MockTransport::new();
        let mut link = supervisor(&mock);
        let now = Instant::now();
        for _ in 0..3 {
            link.tick(now).await;
        }

        link.tick(now + Duration::from_millis(500)).await;
        assert_eq!(mock.reopen_count(), 1);
        assert!(link.health().enabled);
        assert_eq!(link.reinit_due(), None);
        // The silent meter is polled again straight after the reopen
        assert_eq!(mock.requests().len(), 4);
        assert_eq!(link.health().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_waits_for_settle_delay() {
        let mock = MockTransport::new();
        let mut link = supervisor(&mock);
        let now = Instant::now();
        for _ in 0..3 {
            link.tick(now).await;
        }

        assert_eq!(link.service(now + Duration::from_millis(499)).await, None);
        assert_eq!(mock.reopen_count(), 0);
        assert_eq!(
            link.service(now + Duration::from_millis(500)).await,
            Some(Recovery::Restored)
        );
        assert!(link.health().enabled);
        assert_eq!(link.health().consecutive_failures, 0);
        assert_eq!(link.health().restarts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_counts_as_failure() {
        let mock = MockTransport::new();
        mock.queue_reply(MockReply::WriteError("gone".into()));
        let mut link = supervisor(&mock);

        let reading = link.tick(Instant::now()).await;
        assert!(!reading.valid);
        assert_eq!(link.health().consecutive_failures, 1);
        assert!(link.health().last_error.as_deref().unwrap().contains("gone"));
    }
}
