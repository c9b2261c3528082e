use crate::config::BreakerConfig;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, gauge};
use std::sync::atomic::{AtomicU8, Ordering};
#[cfg(feature = "metrics")]
use std::sync::Once;
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Represents the state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Normal operation; calls pass through and are counted.
    Closed = 0,
    /// Calls are rejected immediately without invoking the downstream.
    Open = 1,
    /// A bounded number of trial calls probe for recovery.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Stable label used in metrics and logs.
    pub fn label(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// A permit to execute one guarded call.
///
/// The caller must report the call's outcome via [`Breaker::record`] with
/// this permit's generation. Results carrying a generation older than the
/// breaker's current window are discarded, so a slow call whose outcome
/// arrives after a reset cannot corrupt the new window's counts.
#[derive(Debug, Clone, Copy)]
pub struct Permit {
    generation: u64,
}

impl Permit {
    /// The window generation this permit was issued under.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Snapshot of a breaker's counts for observability.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Completed calls recorded in the current window.
    pub requests: u64,
    /// Failed calls recorded in the current window.
    pub failures: u64,
    /// Successful calls recorded in the current window.
    pub successes: u64,
    /// `failures / requests`, or 0.0 with no samples.
    pub failure_rate: f64,
    /// Current window generation.
    pub generation: u64,
}

#[derive(Debug, Default)]
struct Counts {
    requests: u64,
    failures: u64,
    successes: u64,
}

impl Counts {
    fn clear(&mut self) {
        *self = Counts::default();
    }

    fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }
}

struct BreakerCore {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    window_start: Instant,
    opened_at: Option<Instant>,
    // Trial slots reserved while half-open; reservation happens under this
    // lock so concurrent acquires cannot over-admit past max_requests.
    trial_calls: u64,
}

/// A single circuit breaker with gobreaker-style windowed counting.
///
/// All state transitions happen at two trigger points only: inside
/// [`try_acquire`](Breaker::try_acquire) (Open to HalfOpen after the timeout,
/// Closed window roll) and inside [`record`](Breaker::record) (trip to Open,
/// HalfOpen resolution).
pub struct Breaker {
    core: Mutex<BreakerCore>,
    state_atomic: AtomicU8,
    config: Arc<BreakerConfig>,
}

impl Breaker {
    /// Creates a closed breaker.
    pub fn new(config: Arc<BreakerConfig>) -> Self {
        #[cfg(feature = "metrics")]
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "circuitbreaker_calls_total",
                "Total number of calls seen by the circuit breaker"
            );
            describe_counter!(
                "circuitbreaker_transitions_total",
                "Total number of circuit breaker state transitions"
            );
            describe_gauge!(
                "circuitbreaker_state",
                "Current state of the circuit breaker (0 closed, 1 open, 2 half-open)"
            );
        });
        Self {
            core: Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                window_start: Instant::now(),
                opened_at: None,
                trial_calls: 0,
            }),
            state_atomic: AtomicU8::new(CircuitState::Closed as u8),
            config,
        }
    }

    /// Asks the breaker for a permit to execute one call.
    ///
    /// Returns `None` when the call must be rejected without invoking the
    /// downstream: the breaker is Open and the probe timeout has not elapsed,
    /// or it is HalfOpen with all trial slots taken.
    pub fn try_acquire(&self) -> Option<Permit> {
        let mut core = self.core.lock().unwrap();
        self.roll_window(&mut core);

        let permitted = match core.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = core
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.timeout)
                    .unwrap_or(false);
                if elapsed {
                    self.transition(&mut core, CircuitState::HalfOpen);
                    core.trial_calls = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if core.trial_calls < self.config.max_requests {
                    core.trial_calls += 1;
                    true
                } else {
                    false
                }
            }
        };

        if permitted {
            self.config
                .event_listeners
                .emit(&CircuitBreakerEvent::CallPermitted {
                    gate_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    state: core.state,
                });
            Some(Permit {
                generation: core.generation,
            })
        } else {
            self.config
                .event_listeners
                .emit(&CircuitBreakerEvent::CallRejected {
                    gate_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                });

            #[cfg(feature = "metrics")]
            counter!("circuitbreaker_calls_total", "breaker" => self.config.name.clone(), "outcome" => "rejected")
                .increment(1);

            #[cfg(feature = "tracing")]
            tracing::debug!(breaker = %self.config.name, "circuit breaker rejected call");

            None
        }
    }

    /// Reports the outcome of a permitted call.
    ///
    /// `generation` is the issuing permit's generation; a result tagged with
    /// a superseded generation is dropped without touching the counts.
    pub fn record(&self, generation: u64, success: bool) {
        let mut core = self.core.lock().unwrap();
        self.roll_window(&mut core);

        if generation != core.generation {
            self.config
                .event_listeners
                .emit(&CircuitBreakerEvent::StaleResultDropped {
                    gate_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    generation,
                });

            #[cfg(feature = "tracing")]
            tracing::trace!(
                breaker = %self.config.name,
                stale = generation,
                current = core.generation,
                "dropping result from superseded window"
            );
            return;
        }

        core.counts.requests += 1;
        if success {
            core.counts.successes += 1;
            self.config
                .event_listeners
                .emit(&CircuitBreakerEvent::SuccessRecorded {
                    gate_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    state: core.state,
                });
        } else {
            core.counts.failures += 1;
            self.config
                .event_listeners
                .emit(&CircuitBreakerEvent::FailureRecorded {
                    gate_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    state: core.state,
                });
        }

        #[cfg(feature = "metrics")]
        counter!(
            "circuitbreaker_calls_total",
            "breaker" => self.config.name.clone(),
            "outcome" => if success { "success" } else { "failure" }
        )
        .increment(1);

        match core.state {
            CircuitState::Closed => {
                if core.counts.requests >= self.config.min_requests
                    && core.counts.failure_rate() >= self.config.failure_ratio
                {
                    self.transition(&mut core, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                if !success {
                    // Any failed trial reopens with a fresh timeout window.
                    self.transition(&mut core, CircuitState::Open);
                } else if core.counts.successes >= self.config.max_requests {
                    self.transition(&mut core, CircuitState::Closed);
                }
            }
            // A matching generation cannot observe Open: opening bumps it.
            CircuitState::Open => {}
        }
    }

    /// Returns the current state without taking the lock.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }

    /// Returns whether the breaker is currently open.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Forces the breaker open, as if it had tripped.
    pub fn force_open(&self) {
        let mut core = self.core.lock().unwrap();
        self.transition(&mut core, CircuitState::Open);
    }

    /// Forces the breaker closed, clearing all counts.
    pub fn force_closed(&self) {
        let mut core = self.core.lock().unwrap();
        self.transition(&mut core, CircuitState::Closed);
    }

    /// Resets the breaker to Closed with fresh counts.
    ///
    /// Bumps the generation even when already Closed, so in-flight results
    /// from before the reset are discarded.
    pub fn reset(&self) {
        let mut core = self.core.lock().unwrap();
        if core.state == CircuitState::Closed {
            core.generation += 1;
            core.counts.clear();
            core.window_start = Instant::now();
        } else {
            self.transition(&mut core, CircuitState::Closed);
        }
    }

    /// Returns a snapshot of the current window.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let core = self.core.lock().unwrap();
        BreakerSnapshot {
            state: core.state,
            requests: core.counts.requests,
            failures: core.counts.failures,
            successes: core.counts.successes,
            failure_rate: core.counts.failure_rate(),
            generation: core.generation,
        }
    }

    /// Rolls the Closed-state counting window when `interval` has elapsed.
    ///
    /// A zero interval disables periodic resets: counts then accumulate
    /// until the breaker trips or is reset manually.
    fn roll_window(&self, core: &mut BreakerCore) {
        if core.state != CircuitState::Closed
            || self.config.interval.is_zero()
            || core.window_start.elapsed() < self.config.interval
        {
            return;
        }

        core.generation += 1;
        core.counts.clear();
        core.window_start = Instant::now();

        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::WindowReset {
                gate_name: self.config.name.clone(),
                timestamp: Instant::now(),
                generation: core.generation,
            });
    }

    fn transition(&self, core: &mut BreakerCore, to: CircuitState) {
        if core.state == to {
            return;
        }
        let from = core.state;

        core.state = to;
        core.generation += 1;
        core.counts.clear();
        core.trial_calls = 0;
        core.window_start = Instant::now();
        core.opened_at = (to == CircuitState::Open).then(Instant::now);
        self.state_atomic.store(to as u8, Ordering::Release);

        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::StateTransition {
                gate_name: self.config.name.clone(),
                timestamp: Instant::now(),
                from,
                to,
            });

        #[cfg(feature = "tracing")]
        tracing::info!(
            breaker = %self.config.name,
            from = from.label(),
            to = to.label(),
            "circuit breaker state transition"
        );

        #[cfg(feature = "metrics")]
        {
            counter!(
                "circuitbreaker_transitions_total",
                "breaker" => self.config.name.clone(),
                "from" => from.label(),
                "to" => to.label()
            )
            .increment(1);

            gauge!("circuitbreaker_state", "breaker" => self.config.name.clone())
                .set(to as u8 as f64);
        }
    }
}
