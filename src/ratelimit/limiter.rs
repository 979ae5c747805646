//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace};

use super::clock::{Clock, MonotonicClock};
use super::key::ClientKey;
use super::memory::MemoryStore;
use super::store::WindowStore;
use super::window::Usage;
use crate::error::{FloodgateError, Result};

/// Default window length in minutes.
pub const DEFAULT_WINDOW_MINUTES: u64 = 15;
/// Default number of requests allowed per window.
pub const DEFAULT_MAX_REQUESTS: u64 = 100;
/// Default message returned with a denial.
pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";

const MS_PER_MINUTE: u64 = 60 * 1000;

/// Validated limiter parameters. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    window_ms: u64,
    max_requests: u64,
    message: String,
}

impl LimiterConfig {
    /// Create a configuration, rejecting a zero window or a zero limit.
    pub fn new(window_ms: u64, max_requests: u64, message: impl Into<String>) -> Result<Self> {
        if window_ms == 0 {
            return Err(FloodgateError::Configuration(
                "window duration must be greater than zero".to_string(),
            ));
        }
        if max_requests == 0 {
            return Err(FloodgateError::Configuration(
                "max_requests must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            window_ms,
            max_requests,
            message: message.into(),
        })
    }

    /// Create a configuration from a window expressed in minutes.
    ///
    /// Fractional minutes are accepted and rounded to the nearest millisecond.
    pub fn from_minutes(
        minutes: f64,
        max_requests: u64,
        message: impl Into<String>,
    ) -> Result<Self> {
        if !minutes.is_finite() || minutes <= 0.0 {
            return Err(FloodgateError::Configuration(format!(
                "window minutes must be a positive number, got {}",
                minutes
            )));
        }

        let window_ms = (minutes * MS_PER_MINUTE as f64).round() as u64;
        Self::new(window_ms, max_requests, message)
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Window length as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Requests allowed per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Message attached to denials.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MINUTES * MS_PER_MINUTE,
            max_requests: DEFAULT_MAX_REQUESTS,
            message: DEFAULT_MESSAGE.to_string(),
        }
    }
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u64,
    /// When the current window resets, on the limiter's clock
    pub reset_at: u64,
    /// Rejection message, only set when the request is denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Decision {
    pub(crate) fn allow(remaining: u64, reset_at: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_at,
            message: None,
        }
    }

    pub(crate) fn deny(reset_at: u64, message: &str) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at,
            message: Some(message.to_string()),
        }
    }

    /// Milliseconds from `now` until the window resets.
    pub fn retry_after_ms(&self, now: u64) -> u64 {
        self.reset_at.saturating_sub(now)
    }
}

/// Fixed-window rate limiter keyed by client identity.
///
/// Allows at most `max_requests` per key in each window of `window_ms`,
/// where a key's window starts at its first request and restarts at the
/// first request after it elapses. The limiter is thread-safe; share it
/// behind an `Arc`.
pub struct Limiter<S: WindowStore = MemoryStore> {
    config: LimiterConfig,
    store: S,
    clock: Arc<dyn Clock>,
}

impl Limiter<MemoryStore> {
    /// Create a limiter backed by an in-memory store.
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_store(config, MemoryStore::new())
    }
}

impl<S: WindowStore> Limiter<S> {
    /// Create a limiter over an explicit store.
    pub fn with_store(config: LimiterConfig, store: S) -> Self {
        Self {
            config,
            store,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Replace the clock used by [`check_now`](Self::check_now) and eviction.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Decide whether a request from `key` at `now` is allowed, counting it
    /// if so.
    pub fn check(&self, key: &ClientKey, now: u64) -> Decision {
        trace!(key = %key, now = now, "Checking rate limit");

        let decision = self.store.hit(key, now, &self.config);

        if !decision.allowed {
            debug!(
                key = %key,
                reset_at = decision.reset_at,
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// [`check`](Self::check) at the limiter clock's current time.
    pub fn check_now(&self, key: &ClientKey) -> Decision {
        self.check(key, self.clock.now_ms())
    }

    /// Current usage for `key` without counting a request.
    ///
    /// Returns `None` if the key is untracked or its window has elapsed.
    pub fn peek(&self, key: &ClientKey, now: u64) -> Option<Usage> {
        self.store.peek(key, now, &self.config)
    }

    /// Forget `key` so its next request opens a fresh window.
    pub fn reset_key(&self, key: &ClientKey) -> bool {
        let removed = self.store.remove(key);
        if removed {
            debug!(key = %key, "Rate limit window reset");
        }
        removed
    }

    /// Drop every window that has elapsed at `now`.
    pub fn evict_expired(&self, now: u64) -> usize {
        self.store.evict_expired(now, self.config.window_ms)
    }

    /// Current time on the limiter's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Number of keys with a tracked window.
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl Default for Limiter<MemoryStore> {
    fn default() -> Self {
        Self::new(LimiterConfig::default())
    }
}
