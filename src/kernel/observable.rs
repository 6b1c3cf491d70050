use std::sync::{Arc, Mutex};

use tracing::debug;

use super::context::ObservationContext;
use super::error::ObservationResult;
use super::event::{Event, EventCollection, Payload};
use super::key::ObservableKey;
use super::lock;

/// Something that can be watched.
///
/// The registry drives the lifecycle: it injects a context, then calls
/// `start_observation` when the first observer for this key appears and
/// `stop_observation` when the last one leaves. Identity is `key()`, never
/// the instance.
pub trait Observable<P: Payload>: Send + Sync {
    fn key(&self) -> ObservableKey;

    /// Injected before start, cleared (`None`) after stop. May be called
    /// more than once.
    fn set_observation_context(&self, context: Option<Arc<ObservationContext<P>>>);

    /// Establish upstream links. Must be a no-op when no context is set.
    fn start_observation(&self) -> ObservationResult<()>;

    /// Release whatever `start_observation` established.
    fn stop_observation(&self) -> ObservationResult<()>;
}

/// Holder for an injected context, shared by the observable implementations.
pub struct ContextSlot<P: Payload> {
    inner: Mutex<Option<Arc<ObservationContext<P>>>>,
}

impl<P: Payload> ContextSlot<P> {
    pub fn new() -> Self {
        Self { inner: Mutex::new(None) }
    }

    pub fn set(&self, context: Option<Arc<ObservationContext<P>>>) {
        *lock(&self.inner) = context;
    }

    pub fn get(&self) -> Option<Arc<ObservationContext<P>>> {
        lock(&self.inner).clone()
    }

    pub fn is_bound(&self) -> bool {
        lock(&self.inner).is_some()
    }

    /// Hand a batch to the bound context. Returns false when unbound.
    pub fn notify(&self, events: EventCollection<P>) -> bool {
        match self.get() {
            Some(context) => context.notify_observers(events),
            None => false,
        }
    }
}

impl<P: Payload> Default for ContextSlot<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain observable that application code publishes into directly.
pub struct KeyedObservable<P: Payload> {
    key: ObservableKey,
    slot: ContextSlot<P>,
}

impl<P: Payload> KeyedObservable<P> {
    pub fn new(key: impl Into<ObservableKey>) -> Self {
        Self {
            key: key.into(),
            slot: ContextSlot::new(),
        }
    }

    pub fn shared(key: impl Into<ObservableKey>) -> Arc<Self> {
        Arc::new(Self::new(key))
    }

    /// True while this instance owns a live context.
    pub fn is_observed(&self) -> bool {
        self.slot.is_bound()
    }

    pub fn publish(&self, events: EventCollection<P>) -> bool {
        self.slot.notify(events)
    }

    pub fn publish_payload(&self, payload: P) -> bool {
        self.publish(Event::payload(self.key.clone(), payload).into())
    }

    pub fn publish_changed(&self) -> bool {
        self.publish(Event::changed(self.key.clone()).into())
    }
}

impl<P: Payload> Observable<P> for KeyedObservable<P> {
    fn key(&self) -> ObservableKey {
        self.key.clone()
    }

    fn set_observation_context(&self, context: Option<Arc<ObservationContext<P>>>) {
        self.slot.set(context);
    }

    fn start_observation(&self) -> ObservationResult<()> {
        debug!(key = %self.key, "keyed observable started");
        Ok(())
    }

    fn stop_observation(&self) -> ObservationResult<()> {
        debug!(key = %self.key, "keyed observable stopped");
        Ok(())
    }
}
