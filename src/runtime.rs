//! # Monitor Loop
//!
//! The single cooperative driver tying the link and the display together.
//! Each iteration, in order:
//!
//! 1. feeds the watchdog, if one is installed
//! 2. advances the display timers (and applies a latched wake)
//! 3. runs a due link re-initialisation
//! 4. polls the meter when the poll interval has elapsed and hands the
//!    reading to the display; otherwise refreshes a lit display every
//!    refresh interval
//! 5. logs link and display statistics every housekeeping interval
//!
//! Nothing in an iteration waits longer than the bus response window, so
//! wake events and the watchdog are served every loop tick.

use crate::constants::{DEFAULT_HOUSEKEEPING_MS, DEFAULT_LOOP_TICK_MS, DEFAULT_REFRESH_MS};
use crate::display::scheduler::{DisplayScheduler, Transition, WakeTrigger};
use crate::display::sink::DisplaySink;
use crate::meter::Reading;
use crate::modbus::transport::Transport;
use crate::supervisor::{LinkSupervisor, Recovery};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Liveness watchdog fed once per loop iteration.
pub trait Watchdog: Send {
    fn feed(&mut self);
}

#[derive(Debug)]
struct WatchdogState {
    last_fed: Instant,
    reported: bool,
    starved: u64,
}

/// Watchdog that logs an error when it goes unfed for longer than its
/// timeout. Clones share state, so one clone can be fed by the loop while
/// another runs [`SoftwareWatchdog::supervise`] as a separate task.
#[derive(Debug, Clone)]
pub struct SoftwareWatchdog {
    timeout: Duration,
    state: Arc<Mutex<WatchdogState>>,
}

impl SoftwareWatchdog {
    pub fn new(timeout: Duration) -> Self {
        SoftwareWatchdog {
            timeout,
            state: Arc::new(Mutex::new(WatchdogState {
                last_fed: Instant::now(),
                reported: false,
                starved: 0,
            })),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Missed feeding windows so far.
    pub fn starved(&self) -> u64 {
        self.lock().starved
    }

    /// Returns true and logs once per missed window when the watchdog has
    /// not been fed within its timeout.
    pub fn check(&self, now: Instant) -> bool {
        let mut state = self.lock();
        let since = now.saturating_duration_since(state.last_fed);
        if since <= self.timeout || state.reported {
            return false;
        }
        state.reported = true;
        state.starved += 1;
        log::error!(
            target: "pzem::loop",
            "watchdog not fed for {since:?} timeout={:?} starved={}",
            self.timeout,
            state.starved
        );
        true
    }

    /// Checks the watchdog forever at half its timeout.
    pub async fn supervise(self) {
        let period = (self.timeout / 2).max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            self.check(Instant::now());
        }
    }

    fn lock(&self) -> MutexGuard<'_, WatchdogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Watchdog for SoftwareWatchdog {
    fn feed(&mut self) {
        let now = Instant::now();
        self.check(now);
        let mut state = self.lock();
        state.last_fed = now;
        state.reported = false;
    }
}

/// Loop cadence apart from the poll interval, which belongs to the link policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    pub tick: Duration,
    pub refresh: Duration,
    pub housekeeping: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        LoopTiming {
            tick: Duration::from_millis(DEFAULT_LOOP_TICK_MS),
            refresh: Duration::from_millis(DEFAULT_REFRESH_MS),
            housekeeping: Duration::from_millis(DEFAULT_HOUSEKEEPING_MS),
        }
    }
}

/// What one iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Iteration {
    pub transition: Option<Transition>,
    pub recovery: Option<Recovery>,
    /// The reading published by this iteration's poll, if one was due.
    pub reading: Option<Reading>,
    pub refreshed: bool,
    pub housekeeping: bool,
}

pub struct MonitorLoop<T: Transport, D: DisplaySink> {
    link: LinkSupervisor<T>,
    display: DisplayScheduler<D>,
    watchdog: Option<Box<dyn Watchdog>>,
    timing: LoopTiming,
    last_poll: Option<Instant>,
    last_refresh: Instant,
    last_housekeeping: Instant,
    iterations: u64,
}

impl<T: Transport, D: DisplaySink> MonitorLoop<T, D> {
    pub fn new(
        link: LinkSupervisor<T>,
        display: DisplayScheduler<D>,
        timing: LoopTiming,
        now: Instant,
    ) -> Self {
        MonitorLoop {
            link,
            display,
            watchdog: None,
            timing,
            last_poll: None,
            last_refresh: now,
            last_housekeeping: now,
            iterations: 0,
        }
    }

    pub fn with_watchdog(mut self, watchdog: Box<dyn Watchdog>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    pub fn link(&self) -> &LinkSupervisor<T> {
        &self.link
    }

    pub fn display(&self) -> &DisplayScheduler<D> {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut DisplayScheduler<D> {
        &mut self.display
    }

    pub fn wake_trigger(&self) -> WakeTrigger {
        self.display.wake_trigger()
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Boot sequence: splash, one initial read, link status message, and a
    /// wake when the meter answered.
    pub async fn startup(&mut self, now: Instant) -> Reading {
        self.display.show_message(&["PZEM Monitor", "Starting..."]);

        let reading = self.link.tick(now).await;
        self.last_poll = Some(now);
        self.display.stage(reading);

        if reading.valid {
            log::info!(target: "pzem::loop", "meter 0x{:02X} answered", self.link.reader_mut().device_address());
            self.display.show_message(&["PZEM Ready", "Reading..."]);
            self.display.wake(now);
            self.display.render();
        } else {
            log::warn!(target: "pzem::loop", "meter did not answer at start-up");
            self.display.show_message(&["PZEM Error", "Check wiring"]);
        }
        self.last_refresh = now;
        reading
    }

    pub async fn run_iteration(&mut self, now: Instant) -> Iteration {
        let mut report = Iteration::default();
        self.iterations += 1;

        if let Some(watchdog) = self.watchdog.as_mut() {
            watchdog.feed();
        }

        report.transition = self.display.tick(now);
        report.recovery = self.link.service(now).await;

        let poll_due = self.last_poll.map_or(true, |last| {
            now.saturating_duration_since(last) >= self.link.policy().poll_interval
        });
        if poll_due {
            let reading = self.link.tick(now).await;
            self.last_poll = Some(now);
            self.display.update(reading);
            self.last_refresh = now;
            report.reading = Some(reading);
        } else if self.display.backlight_on()
            && now.saturating_duration_since(self.last_refresh) >= self.timing.refresh
        {
            report.refreshed = self.display.render();
            self.last_refresh = now;
        }

        if now.saturating_duration_since(self.last_housekeeping) >= self.timing.housekeeping {
            self.housekeeping();
            self.last_housekeeping = now;
            report.housekeeping = true;
        }

        report
    }

    /// Drives iterations every loop tick until `shutdown` resolves, then
    /// shows the shutdown message. An iteration in progress always completes.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.timing.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        log::info!(target: "pzem::loop", "monitor loop started tick={:?}", self.timing.tick);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.run_iteration(Instant::now()).await;
                }
            }
        }
        self.shutdown(Instant::now());
    }

    /// Lights the display and shows the shutdown message.
    pub fn shutdown(&mut self, now: Instant) {
        log::info!(target: "pzem::loop", "monitor loop stopped after {} iterations", self.iterations);
        self.display.wake(now);
        self.display.show_message(&["Stopped", "Goodbye!"]);
    }

    fn housekeeping(&self) {
        let health = self.link.health();
        log::info!(
            target: "pzem::loop",
            "housekeeping link={} polls={} failures={} consecutive={} restarts={} display={} display_faults={} iterations={}",
            if health.enabled { "up" } else { "down" },
            health.total_polls,
            health.total_failures,
            health.consecutive_failures,
            health.restarts,
            self.display.state().name(),
            self.display.faults(),
            self.iterations
        );
    }
}
