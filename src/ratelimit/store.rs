//! Storage abstraction for per-key window state.

use super::key::ClientKey;
use super::limiter::{Decision, LimiterConfig};
use super::window::Usage;

/// Trait for window state storage.
///
/// Implementations own the per-key [`WindowState`](super::WindowState) table
/// and must make [`hit`](WindowStore::hit) a single indivisible step for a
/// given key: two concurrent hits on one key may never both observe the same
/// count. Different keys should not contend on a single global lock.
pub trait WindowStore: Send + Sync {
    /// Record a request for `key` at `now` and return the decision.
    fn hit(&self, key: &ClientKey, now: u64, config: &LimiterConfig) -> Decision;

    /// Current usage for `key` without recording a request.
    fn peek(&self, key: &ClientKey, now: u64, config: &LimiterConfig) -> Option<Usage>;

    /// Forget `key`. Returns whether it was tracked.
    fn remove(&self, key: &ClientKey) -> bool;

    /// Drop every entry whose window has elapsed at `now`. Returns how many
    /// were removed.
    fn evict_expired(&self, now: u64, window_ms: u64) -> usize;

    /// Number of tracked keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every key.
    fn clear(&self);
}
