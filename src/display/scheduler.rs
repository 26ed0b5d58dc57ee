//! # Display Scheduler
//!
//! One state machine decides whether the LCD is lit. The external wake
//! trigger and the autonomous on/off duty cycle both live here, so they
//! cannot disagree about the backlight.
//!
//! ```text
//!            wake                 wake window over
//!  Idle ───────────► WakeActive ───────────────────► DutyOff
//!                      ▲    ▲                         │   ▲
//!                 wake │    │ wake          off phase │   │ on phase
//!                      │    └──────── DutyOn ◄────────┘   │ over
//!                      │                 └────────────────┘
//!                      └──── (from DutyOn or DutyOff)
//! ```
//!
//! A wake while already `WakeActive` is ignored: the first wake's window
//! runs to completion. The machine boots in `DutyOn` so the display starts
//! lit, and at most one transition happens per tick.

use crate::constants::{DEFAULT_DUTY_OFF_MS, DEFAULT_DUTY_ON_MS, DEFAULT_WAKE_MS};
use crate::display::layout::DisplayLayout;
use crate::display::sink::DisplaySink;
use crate::error::DisplayError;
use crate::meter::Reading;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Which phase the display is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    Idle,
    WakeActive { started_at: Instant },
    DutyOn { since: Instant },
    DutyOff { since: Instant },
}

impl DisplayState {
    /// The backlight is a pure function of the state.
    pub fn backlight_on(&self) -> bool {
        matches!(
            self,
            DisplayState::WakeActive { .. } | DisplayState::DutyOn { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            DisplayState::Idle => "idle",
            DisplayState::WakeActive { .. } => "wake",
            DisplayState::DutyOn { .. } => "duty-on",
            DisplayState::DutyOff { .. } => "duty-off",
        }
    }
}

/// A state change made by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: DisplayState,
    pub to: DisplayState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayTiming {
    pub wake: Duration,
    pub on: Duration,
    pub off: Duration,
    /// Without the duty cycle the display rests in `Idle` between wakes.
    pub duty_cycle: bool,
}

impl Default for DisplayTiming {
    fn default() -> Self {
        DisplayTiming {
            wake: Duration::from_millis(DEFAULT_WAKE_MS),
            on: Duration::from_millis(DEFAULT_DUTY_ON_MS),
            off: Duration::from_millis(DEFAULT_DUTY_OFF_MS),
            duty_cycle: true,
        }
    }
}

/// Wake signal that can be raised from anywhere, including other tasks.
///
/// Wakes are latched and applied on the scheduler's next tick; several
/// wakes before that tick collapse into one.
#[derive(Debug, Clone, Default)]
pub struct WakeTrigger {
    pending: Arc<AtomicBool>,
}

impl WakeTrigger {
    pub fn wake(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

pub struct DisplayScheduler<D: DisplaySink> {
    sink: D,
    layout: DisplayLayout,
    timing: DisplayTiming,
    state: DisplayState,
    reading: Reading,
    trigger: WakeTrigger,
    backlight_applied: Option<bool>,
    faults: u64,
}

impl<D: DisplaySink> DisplayScheduler<D> {
    pub fn new(sink: D, layout: DisplayLayout, timing: DisplayTiming, now: Instant) -> Self {
        let state = if timing.duty_cycle {
            DisplayState::DutyOn { since: now }
        } else {
            DisplayState::Idle
        };
        let mut scheduler = DisplayScheduler {
            sink,
            layout,
            timing,
            state,
            reading: Reading::invalid(),
            trigger: WakeTrigger::default(),
            backlight_applied: None,
            faults: 0,
        };
        scheduler.sync_backlight();
        scheduler
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn backlight_on(&self) -> bool {
        self.state.backlight_on()
    }

    pub fn layout(&self) -> DisplayLayout {
        self.layout
    }

    /// Handle for delivering wake events from outside the loop.
    pub fn wake_trigger(&self) -> WakeTrigger {
        self.trigger.clone()
    }

    /// Display calls that failed so far.
    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Applies a wake immediately.
    pub fn wake(&mut self, now: Instant) -> Option<Transition> {
        if let DisplayState::WakeActive { .. } = self.state {
            log::debug!(target: "pzem::display", "wake ignored, window already running");
            return None;
        }
        Some(self.transition(DisplayState::WakeActive { started_at: now }))
    }

    /// Advances the timers and applies a latched wake. At most one transition.
    pub fn tick(&mut self, now: Instant) -> Option<Transition> {
        if self.backlight_applied != Some(self.state.backlight_on()) {
            self.sync_backlight();
        }

        if self.trigger.take() {
            if let Some(t) = self.wake(now) {
                return Some(t);
            }
        }

        let elapsed = |since: Instant| now.saturating_duration_since(since);
        let next = match self.state {
            DisplayState::Idle => None,
            DisplayState::WakeActive { started_at } if elapsed(started_at) >= self.timing.wake => {
                if self.timing.duty_cycle {
                    Some(DisplayState::DutyOff { since: now })
                } else {
                    Some(DisplayState::Idle)
                }
            }
            DisplayState::DutyOff { since } if elapsed(since) >= self.timing.off => {
                Some(DisplayState::DutyOn { since: now })
            }
            DisplayState::DutyOn { since } if elapsed(since) >= self.timing.on => {
                Some(DisplayState::DutyOff { since: now })
            }
            _ => None,
        };

        next.map(|to| self.transition(to))
    }

    /// Hands over the latest reading and renders it if the display is lit.
    pub fn update(&mut self, reading: Reading) -> bool {
        self.reading = reading;
        self.render()
    }

    /// Keeps `reading` for the next render without drawing it.
    pub fn stage(&mut self, reading: Reading) {
        self.reading = reading;
    }

    /// Redraws the last reading. Does nothing while dark.
    pub fn render(&mut self) -> bool {
        if !self.backlight_on() {
            return false;
        }
        let lines = self.layout.render(&self.reading);
        self.draw(&lines)
    }

    /// Shows a status message (boot, shutdown) in place of the reading.
    pub fn show_message(&mut self, lines: &[&str]) -> bool {
        if !self.backlight_on() {
            return false;
        }
        let lines: Vec<String> = lines.iter().map(|line| self.layout.fit(line)).collect();
        self.draw(&lines)
    }

    fn draw(&mut self, lines: &[String]) -> bool {
        let result = self.sink.clear().and_then(|()| {
            lines
                .iter()
                .take(self.layout.rows() as usize)
                .enumerate()
                .filter(|(_, line)| !line.is_empty())
                .try_for_each(|(row, line)| self.sink.write_line(row as u8, line))
        });
        self.check(result, "render")
    }

    fn transition(&mut self, to: DisplayState) -> Transition {
        let from = self.state;
        self.state = to;
        log::info!(target: "pzem::display", "display {} -> {}", from.name(), to.name());

        if from.backlight_on() != to.backlight_on() {
            self.sync_backlight();
            if to.backlight_on() {
                self.render();
            }
        }
        Transition { from, to }
    }

    fn sync_backlight(&mut self) {
        let on = self.state.backlight_on();
        let result = self.sink.set_backlight(on);
        if self.check(result, "backlight") {
            self.backlight_applied = Some(on);
        } else {
            self.backlight_applied = None;
        }
    }

    fn check(&mut self, result: Result<(), DisplayError>, what: &str) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                self.faults += 1;
                log::warn!(target: "pzem::display", "{what} failed error=\"{e}\" faults={}", self.faults);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::sink::{DisplayOp, RecordingDisplay};

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn scheduler(t0: Instant) -> (DisplayScheduler<RecordingDisplay>, RecordingDisplay) {
        let lcd = RecordingDisplay::new();
        let s = DisplayScheduler::new(lcd.clone(), DisplayLayout::Lcd16x2, DisplayTiming::default(), t0);
        (s, lcd)
    }

    #[test]
    fn test_boots_lit_in_duty_on() {
        let t0 = Instant::now();
        let (s, lcd) = scheduler(t0);
        assert_eq!(s.state(), DisplayState::DutyOn { since: t0 });
        assert_eq!(lcd.ops(), vec![DisplayOp::Backlight(true)]);
    }

    #[test]
    fn test_duty_cycle_alternates() {
        let t0 = Instant::now();
        let (mut s, _) = scheduler(t0);

        assert_eq!(s.tick(t0 + secs(19)), None);
        let t = s.tick(t0 + secs(20)).unwrap();
        assert_eq!(t.to, DisplayState::DutyOff { since: t0 + secs(20) });
        assert!(!s.backlight_on());

        assert_eq!(s.tick(t0 + secs(64)), None);
        let t = s.tick(t0 + secs(65)).unwrap();
        assert_eq!(t.to, DisplayState::DutyOn { since: t0 + secs(65) });
    }

    #[test]
    fn test_wake_ignored_while_active() {
        let t0 = Instant::now();
        let (mut s, _) = scheduler(t0);
        s.wake(t0);
        assert_eq!(s.wake(t0 + secs(10)), None);
        assert_eq!(s.state(), DisplayState::WakeActive { started_at: t0 });
        // Window counted from the first wake
        assert!(s.tick(t0 + secs(20)).is_some());
        assert_eq!(s.state(), DisplayState::DutyOff { since: t0 + secs(20) });
    }

    #[test]
    fn test_no_render_while_dark() {
        let t0 = Instant::now();
        let (mut s, lcd) = scheduler(t0);
        s.tick(t0 + secs(20));
        lcd.take_ops();

        assert!(!s.update(Reading::invalid()));
        assert!(!s.show_message(&["Stopped"]));
        assert!(lcd.ops().is_empty());
    }

    #[test]
    fn test_failed_backlight_is_retried() {
        let t0 = Instant::now();
        let (mut s, lcd) = scheduler(t0);
        lcd.fail_next(DisplayError::Bus("nack".into()));
        s.tick(t0 + secs(20)); // -> DutyOff, backlight write fails
        assert_eq!(s.faults(), 1);

        lcd.take_ops();
        s.tick(t0 + secs(21));
        assert_eq!(lcd.ops(), vec![DisplayOp::Backlight(false)]);
    }
}
