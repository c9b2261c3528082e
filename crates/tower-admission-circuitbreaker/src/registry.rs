use crate::breaker::Breaker;
use crate::config::BreakerConfig;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct RouteState {
    breaker: Arc<Breaker>,
    last_seen: Instant,
}

/// A registry of circuit breakers keyed by route.
///
/// Each route gets an independent breaker created lazily from a shared
/// config template, so a failing `/reports` endpoint can trip without
/// affecting `/users`. Breakers are never dropped while open or half-open.
pub struct BreakerRegistry {
    routes: DashMap<String, RouteState>,
    template: BreakerConfig,
}

impl BreakerRegistry {
    /// Creates a registry that stamps new breakers from `template`.
    ///
    /// The template's name is replaced by the route on each breaker.
    pub fn new(template: BreakerConfig) -> Self {
        Self {
            routes: DashMap::new(),
            template,
        }
    }

    /// Returns the breaker for `route`, creating it if absent.
    pub fn breaker(&self, route: &str) -> Arc<Breaker> {
        let mut entry = self
            .routes
            .entry(route.to_string())
            .or_insert_with(|| RouteState {
                breaker: Arc::new(Breaker::new(Arc::new(self.template.with_name(route)))),
                last_seen: Instant::now(),
            });
        entry.last_seen = Instant::now();
        Arc::clone(&entry.breaker)
    }

    /// Returns the breaker for `route` without creating it.
    pub fn get(&self, route: &str) -> Option<Arc<Breaker>> {
        self.routes.get(route).map(|s| Arc::clone(&s.breaker))
    }

    /// Drops closed breakers not used within `max_idle`.
    ///
    /// Open and half-open breakers are retained regardless of idleness so
    /// a tripped route stays tripped until its timeout runs its course.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        // Counted inside the closure; len() before/after would race with
        // concurrent inserts.
        let mut evicted = 0;
        self.routes.retain(|_, state| {
            let keep = state.last_seen.elapsed() < max_idle
                || state.breaker.state() != crate::breaker::CircuitState::Closed;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Number of routes currently tracked.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no routes are tracked.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
