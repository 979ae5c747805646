//! Fixed window state tracked per client key.

use serde::Serialize;

use super::limiter::{Decision, LimiterConfig};

/// Request count within the window that started at `window_start`.
///
/// Timestamps are milliseconds on the limiter's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Requests allowed in the current window
    count: u64,
    /// When the current window started
    window_start: u64,
}

/// Read-only snapshot of a key's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    /// Requests counted in the window so far
    pub count: u64,
    /// Requests still allowed before the window resets
    pub remaining: u64,
    /// When the window resets
    pub reset_at: u64,
}

impl WindowState {
    /// Open a fresh window at `now`.
    pub fn new(now: u64) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Requests counted in this window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Start of this window.
    pub fn window_start(&self) -> u64 {
        self.window_start
    }

    /// End of this window, which is also the start of the next one.
    pub fn reset_at(&self, window_ms: u64) -> u64 {
        self.window_start.saturating_add(window_ms)
    }

    /// Whether the window has elapsed at `now`.
    ///
    /// A `now` earlier than the window start (clock regression) is still
    /// inside the window.
    pub fn is_expired(&self, now: u64, window_ms: u64) -> bool {
        now.saturating_sub(self.window_start) >= window_ms
    }

    /// Record a request at `now` and decide whether it is allowed.
    ///
    /// An elapsed window is reset first, so a request arriving exactly at
    /// `reset_at` opens and counts against the new window. The count is only
    /// incremented for allowed requests and never exceeds `max_requests`.
    pub fn hit(&mut self, now: u64, config: &LimiterConfig) -> Decision {
        if self.is_expired(now, config.window_ms()) {
            self.window_start = now;
            self.count = 0;
        }

        let reset_at = self.reset_at(config.window_ms());

        if self.count < config.max_requests() {
            self.count += 1;
            Decision::allow(config.max_requests() - self.count, reset_at)
        } else {
            Decision::deny(reset_at, config.message())
        }
    }

    /// Current usage at `now`, or `None` if the window has elapsed.
    pub fn usage(&self, now: u64, config: &LimiterConfig) -> Option<Usage> {
        if self.is_expired(now, config.window_ms()) {
            return None;
        }

        Some(Usage {
            count: self.count,
            remaining: config.max_requests().saturating_sub(self.count),
            reset_at: self.reset_at(config.window_ms()),
        })
    }
}
