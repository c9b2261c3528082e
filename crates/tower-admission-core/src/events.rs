//! Event system for admission middleware.
//!
//! Every gate in the admission pipeline (limiter, breaker, retry) emits
//! events describing the decisions it takes. Listeners are registered on a
//! gate's config builder and are invoked synchronously on the request path,
//! so they should be cheap.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events emitted by admission gates.
pub trait AdmissionEvent: Send + Sync + fmt::Debug {
    /// Returns the kind of event (e.g. "state_transition", "rejected").
    fn event_type(&self) -> &'static str;

    /// Returns when this event occurred.
    fn timestamp(&self) -> Instant;

    /// Returns the name of the gate instance that emitted this event.
    fn gate_name(&self) -> &str;
}

/// Trait for listening to admission events.
pub trait EventListener<E: AdmissionEvent>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &E);
}

/// Type alias for shared event listeners.
pub type SharedEventListener<E> = Arc<dyn EventListener<E>>;

/// A collection of event listeners.
#[derive(Clone)]
pub struct EventListeners<E: AdmissionEvent> {
    listeners: Vec<SharedEventListener<E>>,
}

impl<E: AdmissionEvent> EventListeners<E> {
    /// Creates a new empty event listener collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Adds a listener to the collection.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to all registered listeners.
    ///
    /// A panicking listener is isolated so that the remaining listeners
    /// still observe the event.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
        }
    }

    /// Returns true if there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: AdmissionEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Creates a new function-based listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: AdmissionEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct GateEvent {
        gate: String,
        timestamp: Instant,
    }

    impl AdmissionEvent for GateEvent {
        fn event_type(&self) -> &'static str {
            "gate"
        }

        fn timestamp(&self) -> Instant {
            self.timestamp
        }

        fn gate_name(&self) -> &str {
            &self.gate
        }
    }

    fn event() -> GateEvent {
        GateEvent {
            gate: "limiter".to_string(),
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn listeners_observe_each_emit() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(move |_: &GateEvent| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.emit(&event());
        listeners.emit(&event());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_does_not_starve_others() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(|_: &GateEvent| {
            panic!("bad listener");
        }));
        listeners.add(FnListener::new(move |_: &GateEvent| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.emit(&event());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_collection_reports_empty() {
        let listeners: EventListeners<GateEvent> = EventListeners::new();
        assert!(listeners.is_empty());
        assert_eq!(listeners.len(), 0);
    }
}
