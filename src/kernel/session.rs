use std::sync::{Arc, Mutex};

use tracing::debug;

use super::event::Payload;
use super::lock;
use super::observer::{Observer, ObserverId};
use super::registry::ObserverRegistry;

/// Session-scoped registrations.
///
/// Everything registered through a session is unregistered when the
/// session is closed or dropped. This is the teardown path for consumers
/// that would otherwise leak registrations.
pub struct ObservationSession<P: Payload> {
    registry: ObserverRegistry<P>,
    observers: Mutex<Vec<ObserverId>>,
}

impl<P: Payload> ObservationSession<P> {
    pub fn new(registry: ObserverRegistry<P>) -> Self {
        Self {
            registry,
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &ObserverRegistry<P> {
        &self.registry
    }

    pub fn register(&self, observer: Arc<dyn Observer<P>>) -> ObserverId {
        let id = self.registry.register_observer(observer);
        let mut observers = lock(&self.observers);
        if !observers.contains(&id) {
            observers.push(id);
        }
        id
    }

    pub fn unregister(&self, id: ObserverId) -> bool {
        lock(&self.observers).retain(|o| *o != id);
        self.registry.unregister_observer(id)
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    /// Unregister everything, newest first. Returns how many were removed.
    pub fn close(&self) -> usize {
        let observers = std::mem::take(&mut *lock(&self.observers));
        if observers.is_empty() {
            return 0;
        }
        debug!(count = observers.len(), "closing observation session");
        let mut removed = 0;
        for id in observers.into_iter().rev() {
            if self.registry.unregister_observer(id) {
                removed += 1;
            }
        }
        removed
    }
}

impl<P: Payload> Drop for ObservationSession<P> {
    fn drop(&mut self) {
        self.close();
    }
}
