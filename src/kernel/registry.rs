use std::collections::HashMap;
use std::sync::{Arc, Mutex, TryLockError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;

use super::context::{Delivery, ObservationContext};
use super::gate::LifecycleGate;
use super::event::Payload;
use super::key::ObservableKey;
use super::lock;
use super::observer::{observer_addr, Observer, ObserverId};
use super::telemetry::{TelemetryEvent, TelemetryRecorder, TelemetrySnapshot};

/// "Invalidate the current view" hook, called after every fan-out pass.
pub trait RefreshSignal: Send + Sync {
    fn invalidate(&self);
}

/// What one `process_pending` call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Batches fanned out
    pub batches: usize,
    /// Successful observer callbacks
    pub deliveries: usize,
    /// Observer callbacks that returned an error
    pub failures: usize,
    /// Batches whose context was disposed, or whose delegation epoch
    /// ended, before they were applied
    pub dropped: usize,
}

impl DeliveryReport {
    pub fn is_idle(&self) -> bool {
        self.batches == 0 && self.dropped == 0
    }
}

struct Registration<P: Payload> {
    observer: Arc<dyn Observer<P>>,
    key: ObservableKey,
}

struct RegistryState<P: Payload> {
    contexts: HashMap<ObservableKey, Arc<ObservationContext<P>>>,
    observers: HashMap<ObserverId, Registration<P>>,
    /// Instance address of each registered observer. Addresses stay unique
    /// while the registration holds the `Arc`.
    by_instance: HashMap<usize, ObserverId>,
    running: bool,
}

impl<P: Payload> RegistryState<P> {
    fn find_observer(&self, observer: &Arc<dyn Observer<P>>) -> Option<ObserverId> {
        self.by_instance.get(&observer_addr(observer)).copied()
    }
}

pub(crate) struct Shared<P: Payload> {
    state: Mutex<RegistryState<P>>,
    lifecycle: LifecycleGate,
    queue_tx: mpsc::UnboundedSender<Delivery<P>>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<Delivery<P>>>,
    refresh: Mutex<Option<Arc<dyn RefreshSignal>>>,
    telemetry: Mutex<TelemetryRecorder>,
    config: RegistryConfig,
}

/// Directory of live observers and their contexts.
///
/// Explicitly constructed and passed around by handle (cloning is cheap and
/// shares state). One context exists per distinct observable key; its
/// observable is started when the key gains its first observer and stopped
/// when it loses the last one.
///
/// Bookkeeping is mutex-protected and may be touched from any thread.
/// Lifecycle transitions (register, unregister, start, stop, restart) are
/// serialized across threads by a reentrant gate held for the whole
/// transition, hooks included; the same thread may re-enter the registry
/// from a hook. No lock is held while observer callbacks run.
pub struct ObserverRegistry<P: Payload> {
    shared: Arc<Shared<P>>,
}

impl<P: Payload> Clone for ObserverRegistry<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: Payload> Default for ObserverRegistry<P> {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl<P: Payload> ObserverRegistry<P> {
    /// Create a running registry.
    pub fn new(config: RegistryConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let telemetry = TelemetryRecorder::new(config.telemetry_capacity);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState {
                    contexts: HashMap::new(),
                    observers: HashMap::new(),
                    by_instance: HashMap::new(),
                    running: true,
                }),
                lifecycle: LifecycleGate::default(),
                queue_tx,
                queue_rx: Mutex::new(queue_rx),
                refresh: Mutex::new(None),
                telemetry: Mutex::new(telemetry),
                config,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared<P>>) -> Self {
        Self { shared }
    }

    pub fn with_refresh_signal(self, signal: Arc<dyn RefreshSignal>) -> Self {
        *lock(&self.shared.refresh) = Some(signal);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.shared.config
    }

    /// Register an observer for the observable it names.
    ///
    /// Registering the same observer instance twice is a no-op that returns
    /// the existing id.
    pub fn register_observer(&self, observer: Arc<dyn Observer<P>>) -> ObserverId {
        let _gate = self.shared.lifecycle.enter();
        let observable = observer.observable();
        let key = observable.key();

        let (id, created) = {
            let mut state = lock(&self.shared.state);

            if let Some(existing) = state.find_observer(&observer) {
                drop(state);
                warn!(key = %key, observer = %existing, "observer registered twice; keeping the existing registration");
                self.record(TelemetryEvent::DuplicateRegistration { key });
                return existing;
            }

            let existing = state.contexts.get(&key).cloned();
            let (context, created) = match existing {
                Some(context) => (context, false),
                None => {
                    let context = ObservationContext::new(
                        key.clone(),
                        observable,
                        Arc::downgrade(&self.shared),
                        self.shared.queue_tx.clone(),
                    );
                    state.contexts.insert(key.clone(), Arc::clone(&context));
                    (context, true)
                }
            };

            let id = ObserverId::new();
            state.by_instance.insert(observer_addr(&observer), id);
            state.observers.insert(
                id,
                Registration {
                    observer: Arc::clone(&observer),
                    key: key.clone(),
                },
            );
            context.attach(id, observer);

            let running = state.running;
            (id, created.then_some((context, running)))
        };

        if let Some((context, running)) = created {
            debug!(key = %key, "observation context created");
            self.record(TelemetryEvent::ContextCreated { key: key.clone() });
            context
                .observable()
                .set_observation_context(Some(Arc::clone(&context)));
            if running {
                self.start_context(&context);
            } else {
                debug!(key = %key, "registry stopped; start deferred");
            }
        }

        id
    }

    /// Unregister an observer. Safe from inside any observer callback.
    ///
    /// Returns false (and logs) when the id is unknown. Removing the last
    /// observer of a key stops its observable and disposes its context.
    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        let _gate = self.shared.lifecycle.enter();
        let released = {
            let mut state = lock(&self.shared.state);
            let Some(registration) = state.observers.remove(&id) else {
                drop(state);
                warn!(observer = %id, "unregistering an observer with no known context");
                self.record(TelemetryEvent::UnknownUnregistration);
                return false;
            };
            state.by_instance.remove(&observer_addr(&registration.observer));

            let remaining = state
                .contexts
                .get(&registration.key)
                .map(|context| context.detach(id))
                .unwrap_or(0);

            if remaining == 0 {
                let running = state.running;
                state.contexts.remove(&registration.key).map(|context| {
                    context.mark_disposed();
                    (context, running)
                })
            } else {
                None
            }
        };

        if let Some((context, running)) = released {
            if running {
                self.stop_context(&context);
            }
            context.observable().set_observation_context(None);
            context.dispose();
            debug!(key = %context.key(), "observation context disposed");
            self.record(TelemetryEvent::ContextDisposed {
                key: context.key().clone(),
            });
        }

        true
    }

    /// Run `f` as one lifecycle transition.
    pub(crate) fn transition<R>(&self, f: impl FnOnce() -> R) -> R {
        let _gate = self.shared.lifecycle.enter();
        f()
    }

    /// Live context for `key`, if any observer is interested in it.
    pub fn context(&self, key: &ObservableKey) -> Option<Arc<ObservationContext<P>>> {
        lock(&self.shared.state).contexts.get(key).cloned()
    }

    pub fn context_count(&self) -> usize {
        lock(&self.shared.state).contexts.len()
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.shared.state).observers.len()
    }

    pub fn is_registered(&self, id: ObserverId) -> bool {
        lock(&self.shared.state).observers.contains_key(&id)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.state).running
    }

    /// Start observation on every live context. Also the retry path for
    /// contexts whose upstream start failed.
    pub fn start(&self) {
        let _gate = self.shared.lifecycle.enter();
        let contexts = {
            let mut state = lock(&self.shared.state);
            state.running = true;
            state.contexts.values().cloned().collect::<Vec<_>>()
        };
        info!(contexts = contexts.len(), "observer registry started");
        for context in contexts {
            self.start_context(&context);
        }
    }

    /// Stop observation on every live context. Registrations are kept.
    pub fn stop(&self) {
        let _gate = self.shared.lifecycle.enter();
        let contexts = {
            let mut state = lock(&self.shared.state);
            if !state.running {
                return;
            }
            state.running = false;
            state.contexts.values().cloned().collect::<Vec<_>>()
        };
        info!(contexts = contexts.len(), "observer registry stopped");
        for context in contexts {
            self.stop_context(&context);
        }
    }

    /// Stop then start observation for one key. Returns false when no
    /// context exists for it or the registry is stopped.
    pub fn restart_observation(&self, key: &ObservableKey) -> bool {
        let _gate = self.shared.lifecycle.enter();
        let context = {
            let state = lock(&self.shared.state);
            if !state.running {
                return false;
            }
            state.contexts.get(key).cloned()
        };
        let Some(context) = context else {
            return false;
        };
        self.stop_context(&context);
        self.start_context(&context);
        !context.is_degraded()
    }

    /// Apply queued batches on the calling thread, in the order they were
    /// queued.
    ///
    /// A nested call (from inside an observer callback) or a concurrent call
    /// from another thread returns an empty report.
    pub fn process_pending(&self) -> DeliveryReport {
        let mut queue = match self.shared.queue_rx.try_lock() {
            Ok(queue) => queue,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("pending events already being applied");
                return DeliveryReport::default();
            }
        };

        let limit = self.shared.config.max_batches_per_tick;
        let mut report = DeliveryReport::default();

        while limit == 0 || report.batches + report.dropped < limit {
            let Ok(delivery) = queue.try_recv() else {
                break;
            };

            let stale = delivery.epoch.as_ref().is_some_and(|e| !e.is_current());
            let context = delivery
                .context
                .upgrade()
                .filter(|c| !c.is_disposed() && !stale);
            let Some(context) = context else {
                report.dropped += 1;
                self.record(TelemetryEvent::BatchDropped);
                continue;
            };

            let outcome = context.fan_out(&delivery.events);
            report.batches += 1;
            report.deliveries += outcome.delivered;
            report.failures += outcome.failed;

            self.record(TelemetryEvent::BatchDelivered {
                key: context.key().clone(),
                events: delivery.events.len(),
                observers: outcome.delivered,
            });
            for _ in 0..outcome.failed {
                self.record(TelemetryEvent::ObserverFailed {
                    key: context.key().clone(),
                });
            }

            self.signal_refresh();
        }

        report
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        lock(&self.shared.telemetry).snapshot()
    }

    pub fn telemetry_events(&self) -> Vec<TelemetryEvent> {
        lock(&self.shared.telemetry).events().cloned().collect()
    }

    fn start_context(&self, context: &ObservationContext<P>) {
        let key = context.key().clone();
        match context.observable().start_observation() {
            Ok(()) => {
                context.set_degraded(false);
                debug!(key = %key, "observation started");
                self.record(TelemetryEvent::ObservationStarted { key });
            }
            Err(e) => {
                context.set_degraded(true);
                warn!(key = %key, error = %e, "observation start failed; context kept without upstream link");
                self.record(TelemetryEvent::StartFailed { key });
            }
        }
    }

    fn stop_context(&self, context: &ObservationContext<P>) {
        let key = context.key().clone();
        match context.observable().stop_observation() {
            Ok(()) => {
                debug!(key = %key, "observation stopped");
                self.record(TelemetryEvent::ObservationStopped { key });
            }
            Err(e) => {
                // Not retried: a persistent failure leaks the upstream link.
                warn!(key = %key, error = %e, "observation stop failed");
                self.record(TelemetryEvent::StopFailed { key });
            }
        }
    }

    fn signal_refresh(&self) {
        let signal = lock(&self.shared.refresh).clone();
        if let Some(signal) = signal {
            signal.invalidate();
        }
    }

    fn record(&self, event: TelemetryEvent) {
        lock(&self.shared.telemetry).record(event);
    }
}
