use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_admission_circuitbreaker::BreakerRegistry;
use tower_admission_ratelimiter::KeyedRateLimiter;

/// Spawns a background task that periodically drops idle per-key state.
///
/// Every `period`, token buckets unused for `max_idle` are removed (a
/// returning key simply starts over with a full bucket) and closed breakers
/// unused for `max_idle` are dropped. Open and half-open breakers survive
/// sweeps regardless of idleness.
///
/// The task runs until the returned handle is aborted or the runtime shuts
/// down.
pub fn spawn_idle_sweeper(
    limiter: Arc<KeyedRateLimiter>,
    registry: Arc<BreakerRegistry>,
    period: Duration,
    max_idle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a fresh pipeline is
        // not swept before it has served anything.
        interval.tick().await;

        loop {
            interval.tick().await;
            let buckets = limiter.sweep_idle(max_idle);
            let breakers = registry.sweep_idle(max_idle);

            #[cfg(feature = "tracing")]
            if buckets > 0 || breakers > 0 {
                tracing::debug!(buckets, breakers, "swept idle admission state");
            }
            #[cfg(not(feature = "tracing"))]
            let _ = (buckets, breakers);
        }
    })
}
