//! Background removal of expired windows.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::limiter::Limiter;
use super::store::WindowStore;

/// Periodically evict expired windows until `shutdown` resolves.
///
/// Eviction reads the limiter's own clock, so callers passing explicit
/// timestamps to [`Limiter::check`] should take them from
/// [`Limiter::now_ms`]. `period` must be non-zero.
pub fn spawn_evictor<S, F>(
    limiter: Arc<Limiter<S>>,
    period: Duration,
    shutdown: F,
) -> JoinHandle<()>
where
    S: WindowStore + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!(period_ms = period.as_millis() as u64, "Window evictor started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Window evictor stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = limiter.evict_expired(limiter.now_ms());
                    if removed > 0 {
                        debug!(
                            removed = removed,
                            tracked = limiter.tracked_keys(),
                            "Evicted expired windows"
                        );
                    }
                }
            }
        }
    })
}
