//! # Throttled and Frame Logging
//!
//! Rate limiting for repeated link warnings and a consistent hex dump format
//! for Modbus request/response frames.
//!
//! ```rust
//! use pzem_rs::util::logging::{LogThrottle, log_frame_hex};
//!
//! let mut throttle = LogThrottle::new(60_000, 1);
//! if throttle.allow() {
//!     log::warn!("link disabled, skipping poll");
//! }
//! log_frame_hex("tx", &[0x01, 0x04, 0x00, 0x00, 0x00, 0x0A, 0x70, 0x0D]);
//! ```

use tokio::time::Instant;

/// Throttling structure for rate-limiting log messages
///
/// A dead bus produces the same warning on every poll tick; the throttle
/// lets the first few through per window and drops the rest. Windows run on
/// the tokio clock, the same one the link supervisor schedules against.
#[derive(Debug)]
pub struct LogThrottle {
    /// Time window for throttling (in milliseconds)
    window_ms: u64,
    /// Maximum messages allowed per window
    cap: u32,
    /// Current message count in window
    count: u32,
    /// Messages dropped since the last reset
    suppressed: u64,
    /// Start time of current window
    t0: Instant,
}

impl LogThrottle {
    /// Create new throttle with time window and message cap
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            suppressed: 0,
            t0: Instant::now(),
        }
    }

    /// Check if logging is allowed (resets counter after window expires)
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.t0).as_millis() as u64;

        if elapsed_ms > self.window_ms {
            self.t0 = now;
            self.count = 0;
        }

        self.count += 1;
        let allowed = self.count <= self.cap;
        if !allowed {
            self.suppressed += 1;
        }
        allowed
    }

    /// Number of messages dropped since creation or the last reset
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    /// Reset the throttle (start new window immediately)
    pub fn reset(&mut self) {
        self.t0 = Instant::now();
        self.count = 0;
        self.suppressed = 0;
    }
}

/// Log frame data in hex format for debugging
///
/// Output is capped so a runaway response cannot flood the log.
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 64;

    if !log::log_enabled!(target: "pzem::frame", log::Level::Debug) {
        return;
    }

    let shown = &data[..data.len().min(MAX_LOG_BYTES)];
    let hex_str = crate::util::hex::format_hex_compact(shown);
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" ... ({} bytes total)", data.len())
    } else {
        String::new()
    };

    log::debug!(target: "pzem::frame", "{prefix}: {hex_str}{suffix}");
}
