//! Character display capability.
//!
//! The controller specifics (I2C expander, nibble timing, DDRAM offsets)
//! live behind [`DisplaySink`]; the scheduler only ever writes whole rows.

use crate::error::DisplayError;
use std::sync::{Arc, Mutex, MutexGuard};

/// A character display with a switchable backlight.
pub trait DisplaySink: Send {
    /// Writes `text` at the start of `row`; text longer than the display is cut.
    fn write_line(&mut self, row: u8, text: &str) -> Result<(), DisplayError>;

    fn clear(&mut self) -> Result<(), DisplayError>;

    fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError>;
}

/// Display stand-in that logs what a real LCD would show.
#[derive(Debug)]
pub struct ConsoleDisplay {
    rows: u8,
    columns: usize,
    lines: Vec<String>,
    backlight: bool,
}

impl ConsoleDisplay {
    pub fn new(rows: u8, columns: usize) -> Self {
        ConsoleDisplay {
            rows,
            columns,
            lines: vec![String::new(); rows as usize],
            backlight: false,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn backlight(&self) -> bool {
        self.backlight
    }
}

impl DisplaySink for ConsoleDisplay {
    fn write_line(&mut self, row: u8, text: &str) -> Result<(), DisplayError> {
        if row >= self.rows {
            return Err(DisplayError::RowOutOfRange {
                row,
                rows: self.rows,
            });
        }
        let shown: String = text.chars().take(self.columns).collect();
        log::info!(target: "pzem::display", "[{row}] {shown}");
        self.lines[row as usize] = shown;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.lines.iter_mut().for_each(String::clear);
        Ok(())
    }

    fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError> {
        log::info!(target: "pzem::display", "backlight {}", if on { "on" } else { "off" });
        self.backlight = on;
        Ok(())
    }
}

/// One call made on a [`RecordingDisplay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayOp {
    Write(u8, String),
    Clear,
    Backlight(bool),
}

#[derive(Debug, Default)]
struct Recording {
    ops: Vec<DisplayOp>,
    fail_next: Option<DisplayError>,
}

/// Display that records every call; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingDisplay {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<DisplayOp> {
        self.lock().ops.clone()
    }

    /// Drains the recorded calls.
    pub fn take_ops(&self) -> Vec<DisplayOp> {
        std::mem::take(&mut self.lock().ops)
    }

    /// Makes the next call fail with `error`.
    pub fn fail_next(&self, error: DisplayError) {
        self.lock().fail_next = Some(error);
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, op: DisplayOp) -> Result<(), DisplayError> {
        let mut rec = self.lock();
        if let Some(err) = rec.fail_next.take() {
            return Err(err);
        }
        rec.ops.push(op);
        Ok(())
    }
}

impl DisplaySink for RecordingDisplay {
    fn write_line(&mut self, row: u8, text: &str) -> Result<(), DisplayError> {
        self.record(DisplayOp::Write(row, text.to_string()))
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.record(DisplayOp::Clear)
    }

    fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError> {
        self.record(DisplayOp::Backlight(on))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_display_truncates_and_bounds_rows() {
        let mut lcd = ConsoleDisplay::new(2, 16);
        lcd.write_line(0, "0123456789ABCDEFGHIJ").unwrap();
        assert_eq!(lcd.lines()[0], "0123456789ABCDEF");
        assert_eq!(
            lcd.write_line(2, "x"),
            Err(DisplayError::RowOutOfRange { row: 2, rows: 2 })
        );
        lcd.clear().unwrap();
        assert!(lcd.lines().iter().all(String::is_empty));
    }

    #[test]
    fn test_recording_display_failure_injection() {
        let mut lcd = RecordingDisplay::new();
        lcd.fail_next(DisplayError::Bus("nack".into()));
        assert!(lcd.set_backlight(true).is_err());
        lcd.set_backlight(true).unwrap();
        assert_eq!(lcd.ops(), vec![DisplayOp::Backlight(true)]);
    }
}
