//! In-memory window store.

use dashmap::DashMap;
use tracing::debug;

use super::key::ClientKey;
use super::limiter::{Decision, LimiterConfig};
use super::store::WindowStore;
use super::window::{Usage, WindowState};

/// Window store backed by a sharded concurrent map.
///
/// Keys are spread over shards by hash. A hit holds only the write lock of
/// the key's shard, so the read-compare-increment for one key is atomic while
/// unrelated keys proceed in parallel. Eviction takes the same shard locks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    windows: DashMap<ClientKey, WindowState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-sized for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            windows: DashMap::with_capacity(capacity),
        }
    }

    /// Copy of the state tracked for `key`, if any.
    pub fn window(&self, key: &ClientKey) -> Option<WindowState> {
        self.windows.get(key).map(|state| *state)
    }
}

impl WindowStore for MemoryStore {
    fn hit(&self, key: &ClientKey, now: u64, config: &LimiterConfig) -> Decision {
        // Fast path avoids cloning the key for clients we already track
        if let Some(mut state) = self.windows.get_mut(key) {
            return state.hit(now, config);
        }

        let mut state = self.windows.entry(key.clone()).or_insert_with(|| {
            debug!(
                key = %key,
                window_ms = config.window_ms(),
                max_requests = config.max_requests(),
                "Tracking new client key"
            );
            WindowState::new(now)
        });
        state.hit(now, config)
    }

    fn peek(&self, key: &ClientKey, now: u64, config: &LimiterConfig) -> Option<Usage> {
        self.windows
            .get(key)
            .and_then(|state| state.usage(now, config))
    }

    fn remove(&self, key: &ClientKey) -> bool {
        self.windows.remove(key).is_some()
    }

    fn evict_expired(&self, now: u64, window_ms: u64) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, state| {
            let keep = !state.is_expired(now, window_ms);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn len(&self) -> usize {
        self.windows.len()
    }

    fn clear(&self) {
        self.windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LimiterConfig {
        LimiterConfig::new(1000, 2, "slow down").unwrap()
    }

    #[test]
    fn test_hit_creates_window() {
        let store = MemoryStore::new();
        let key = ClientKey::from("alice");

        assert!(store.is_empty());
        let decision = store.hit(&key, 250, &config());

        assert!(decision.allowed);
        assert_eq!(store.len(), 1);
        let state = store.window(&key).unwrap();
        assert_eq!(state.window_start(), 250);
        assert_eq!(state.count(), 1);
    }

    #[test]
    fn test_keys_have_separate_windows() {
        let store = MemoryStore::new();
        let config = config();
        let alice = ClientKey::from("alice");
        let bob = ClientKey::from("bob");

        store.hit(&alice, 0, &config);
        store.hit(&alice, 1, &config);
        assert!(!store.hit(&alice, 2, &config).allowed);

        assert!(store.hit(&bob, 2, &config).allowed);
        assert_eq!(store.window(&bob).unwrap().count(), 1);
    }

    #[test]
    fn test_peek_does_not_count() {
        let store = MemoryStore::new();
        let config = config();
        let key = ClientKey::from("alice");

        assert!(store.peek(&key, 0, &config).is_none());

        store.hit(&key, 0, &config);
        for _ in 0..5 {
            let usage = store.peek(&key, 10, &config).unwrap();
            assert_eq!(usage.count, 1);
            assert_eq!(usage.remaining, 1);
        }
        assert_eq!(store.window(&key).unwrap().count(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = MemoryStore::new();
        let config = config();
        let key = ClientKey::from("alice");

        store.hit(&key, 0, &config);
        store.hit(&ClientKey::from("bob"), 0, &config);

        assert!(store.remove(&key));
        assert!(!store.remove(&key));
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_evict_expired_keeps_live_windows() {
        let store = MemoryStore::with_capacity(8);
        let config = config();

        store.hit(&ClientKey::from("old"), 0, &config);
        store.hit(&ClientKey::from("recent"), 600, &config);
        store.hit(&ClientKey::from("future"), 5000, &config);

        let removed = store.evict_expired(1200, config.window_ms());

        assert_eq!(removed, 1);
        assert_eq!(store.len(), 2);
        assert!(store.window(&ClientKey::from("old")).is_none());
        assert!(store.window(&ClientKey::from("recent")).is_some());
        // A window that starts after `now` is never considered expired
        assert!(store.window(&ClientKey::from("future")).is_some());
    }
}
