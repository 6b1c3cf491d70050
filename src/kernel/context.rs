use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::error::{ObservationError, ObservationResult};
use super::event::{EventCollection, Payload};
use super::key::ObservableKey;
use super::lock;
use super::observable::Observable;
use super::observer::{Observer, ObserverId};
use super::registry::{ObserverRegistry, Shared};

/// A batch waiting for the owning session to apply it.
pub(crate) struct Delivery<P: Payload> {
    pub(crate) context: Weak<ObservationContext<P>>,
    pub(crate) events: EventCollection<P>,
    pub(crate) epoch: Option<Epoch>,
}

/// Generation a queued batch was produced in. The batch is dropped when the
/// counter has moved on by the time it is applied.
#[derive(Debug, Clone)]
pub(crate) struct Epoch {
    counter: Arc<AtomicU64>,
    value: u64,
}

impl Epoch {
    pub(crate) fn new(counter: Arc<AtomicU64>, value: u64) -> Self {
        Self { counter, value }
    }

    pub(crate) fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.value
    }
}

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FanOut {
    pub delivered: usize,
    pub failed: usize,
}

/// Fan-out hub bound to one observable key.
///
/// Exists exactly as long as at least one observer is interested in the key.
/// Events handed to `notify_observers` are queued, not delivered: the
/// registry applies them on the session's thread in `process_pending`.
pub struct ObservationContext<P: Payload> {
    key: ObservableKey,
    observable: Arc<dyn Observable<P>>,
    /// Observers attached directly by the registry
    observers: Mutex<Vec<(ObserverId, Arc<dyn Observer<P>>)>>,
    /// Observers this context registered on behalf of delegation
    registered: Mutex<Vec<ObserverId>>,
    registry: Weak<Shared<P>>,
    queue: mpsc::UnboundedSender<Delivery<P>>,
    me: Weak<ObservationContext<P>>,
    disposed: AtomicBool,
    degraded: AtomicBool,
}

impl<P: Payload> ObservationContext<P> {
    pub(crate) fn new(
        key: ObservableKey,
        observable: Arc<dyn Observable<P>>,
        registry: Weak<Shared<P>>,
        queue: mpsc::UnboundedSender<Delivery<P>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            key,
            observable,
            observers: Mutex::new(Vec::new()),
            registered: Mutex::new(Vec::new()),
            registry,
            queue,
            me: me.clone(),
            disposed: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> &ObservableKey {
        &self.key
    }

    /// The instance that created this context and owns its lifecycle
    pub fn observable(&self) -> &Arc<dyn Observable<P>> {
        &self.observable
    }

    /// Queue a batch for every direct observer. Safe from any thread.
    ///
    /// Empty batches and batches for a disposed context are discarded;
    /// returns whether the batch was queued.
    pub fn notify_observers(&self, events: EventCollection<P>) -> bool {
        self.enqueue(events, None)
    }

    /// Like `notify_observers`, but the batch is discarded at apply time if
    /// `epoch` is no longer current.
    pub(crate) fn notify_in_epoch(&self, events: EventCollection<P>, epoch: Epoch) -> bool {
        self.enqueue(events, Some(epoch))
    }

    fn enqueue(&self, events: EventCollection<P>, epoch: Option<Epoch>) -> bool {
        if events.is_empty() {
            debug!(key = %self.key, "empty batch discarded");
            return false;
        }
        if self.is_disposed() {
            debug!(key = %self.key, events = events.len(), "batch for disposed context discarded");
            return false;
        }
        let delivery = Delivery {
            context: self.me.clone(),
            events,
            epoch,
        };
        if self.queue.send(delivery).is_err() {
            warn!(key = %self.key, "registry queue closed; batch lost");
            return false;
        }
        true
    }

    /// Register `observer` with the registry on behalf of this context.
    ///
    /// The registration is torn down together with this context. The
    /// observer's own observable gets its own context from the registry;
    /// this context is never injected into it.
    pub fn register_observer(&self, observer: Arc<dyn Observer<P>>) -> ObservationResult<ObserverId> {
        let registry = self.registry()?;
        let id = registry.register_observer(observer);
        let mut registered = lock(&self.registered);
        if !registered.contains(&id) {
            registered.push(id);
        }
        Ok(id)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        let tracked = {
            let mut registered = lock(&self.registered);
            let before = registered.len();
            registered.retain(|r| *r != id);
            registered.len() != before
        };
        if !tracked {
            debug!(key = %self.key, observer = %id, "observer was not registered through this context");
        }
        match self.registry() {
            Ok(registry) => registry.unregister_observer(id),
            Err(_) => false,
        }
    }

    /// Unregister everything this context registered for delegation.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let registered = std::mem::take(&mut *lock(&self.registered));
        if registered.is_empty() {
            return;
        }
        debug!(key = %self.key, count = registered.len(), "disposing delegated registrations");
        if let Ok(registry) = self.registry() {
            for id in registered {
                registry.unregister_observer(id);
            }
        }
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    pub fn delegated_count(&self) -> usize {
        lock(&self.registered).len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// True when the last `start_observation` failed; the context then has
    /// no upstream link until an explicit restart succeeds.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub(crate) fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::SeqCst);
    }

    pub(crate) fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn attach(&self, id: ObserverId, observer: Arc<dyn Observer<P>>) {
        let mut observers = lock(&self.observers);
        if !observers.iter().any(|(existing, _)| *existing == id) {
            observers.push((id, observer));
        }
    }

    /// Remove a direct observer; returns how many remain.
    pub(crate) fn detach(&self, id: ObserverId) -> usize {
        let mut observers = lock(&self.observers);
        observers.retain(|(existing, _)| *existing != id);
        observers.len()
    }

    fn contains(&self, id: ObserverId) -> bool {
        lock(&self.observers).iter().any(|(existing, _)| *existing == id)
    }

    /// Deliver one batch to a snapshot of the direct observers.
    ///
    /// No lock is held while callbacks run, so callbacks may register or
    /// unregister freely. An observer removed earlier in this pass is skipped.
    pub(crate) fn fan_out(&self, events: &EventCollection<P>) -> FanOut {
        let snapshot: Vec<(ObserverId, Arc<dyn Observer<P>>)> = lock(&self.observers).clone();
        let mut outcome = FanOut::default();

        for (id, observer) in snapshot {
            if !self.contains(id) {
                continue;
            }
            match observer.on_events(events) {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    warn!(key = %self.key, observer = %id, error = %e, "observer failed; continuing delivery");
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }

    pub(crate) fn registry(&self) -> ObservationResult<ObserverRegistry<P>> {
        self.registry
            .upgrade()
            .map(ObserverRegistry::from_shared)
            .ok_or(ObservationError::RegistryClosed)
    }
}
