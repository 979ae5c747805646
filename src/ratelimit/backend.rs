//! Limiter trait consumed by the request-handling layer.

use async_trait::async_trait;

use super::key::ClientKey;
use super::limiter::{Decision, Limiter};
use super::store::WindowStore;
use super::window::Usage;

/// Trait for limiter implementations the decision service can drive.
///
/// Timestamps come from the backend's own clock. The in-process
/// [`Limiter`] never suspends; the trait is async so a backend over an
/// external store can be plugged in behind the same service.
#[async_trait]
pub trait LimiterBackend: Send + Sync {
    /// Count a request for `key` and decide whether it is allowed.
    async fn check(&self, key: &ClientKey) -> Decision;

    /// Current usage for `key` without counting a request.
    async fn peek(&self, key: &ClientKey) -> Option<Usage>;

    /// Forget `key`. Returns whether it was tracked.
    async fn reset(&self, key: &ClientKey) -> bool;

    /// Requests allowed per window.
    fn max_requests(&self) -> u64;
}

#[async_trait]
impl<S: WindowStore> LimiterBackend for Limiter<S> {
    async fn check(&self, key: &ClientKey) -> Decision {
        self.check_now(key)
    }

    async fn peek(&self, key: &ClientKey) -> Option<Usage> {
        Limiter::peek(self, key, self.now_ms())
    }

    async fn reset(&self, key: &ClientKey) -> bool {
        self.reset_key(key)
    }

    fn max_requests(&self) -> u64 {
        self.config().max_requests()
    }
}
