use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::kernel::context::{Epoch, ObservationContext};
use crate::kernel::error::ObservationResult;
use crate::kernel::event::{EventCollection, Payload};
use crate::kernel::key::ObservableKey;
use crate::kernel::lock;
use crate::kernel::observable::{ContextSlot, Observable};
use crate::kernel::observer::{Observer, ObserverId};

/// Observer of the target, registered through the delegate's own context.
struct TargetObserver<P: Payload> {
    target: Arc<dyn Observable<P>>,
    context: Arc<ObservationContext<P>>,
    source: ObservableKey,
    generation: u64,
    current: Arc<AtomicU64>,
}

impl<P: Payload> Observer<P> for TargetObserver<P> {
    fn observable(&self) -> Arc<dyn Observable<P>> {
        Arc::clone(&self.target)
    }

    fn on_events(&self, events: &EventCollection<P>) -> anyhow::Result<()> {
        // Target was swapped out after this batch was queued
        if self.current.load(Ordering::SeqCst) != self.generation {
            return Ok(());
        }
        let translated: EventCollection<P> = events
            .iter()
            .map(|event| event.retarget(self.source.clone()))
            .collect();
        // Copies queued now are dropped if the target is swapped before
        // they are applied
        let epoch = Epoch::new(Arc::clone(&self.current), self.generation);
        self.context.notify_in_epoch(translated, epoch);
        Ok(())
    }
}

struct Link<P: Payload> {
    target: Option<Arc<dyn Observable<P>>>,
    /// Registration on the current target and the context it went through
    attached: Option<(ObserverId, Arc<ObservationContext<P>>)>,
    observing: bool,
}

/// Observable implemented by observing another observable.
///
/// While observed, it keeps exactly one observer on its target and
/// re-publishes every target event under its own key. Chains of delegates
/// need no dedicated listener types.
pub struct DelegatingObservable<P: Payload> {
    key: ObservableKey,
    slot: ContextSlot<P>,
    link: Mutex<Link<P>>,
    generation: Arc<AtomicU64>,
}

impl<P: Payload> DelegatingObservable<P> {
    pub fn new(key: impl Into<ObservableKey>, target: Option<Arc<dyn Observable<P>>>) -> Self {
        Self {
            key: key.into(),
            slot: ContextSlot::new(),
            link: Mutex::new(Link {
                target,
                attached: None,
                observing: false,
            }),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn target(&self) -> Option<Arc<dyn Observable<P>>> {
        lock(&self.link).target.clone()
    }

    /// Id of the observer currently registered on the target
    pub fn target_observer(&self) -> Option<ObserverId> {
        lock(&self.link).attached.as_ref().map(|(id, _)| *id)
    }

    /// Swap the target. When observing, the old target's observer is
    /// unregistered before the new one is registered, and no event from the
    /// old target is re-published after this call begins.
    pub fn set_target(&self, target: Option<Arc<dyn Observable<P>>>) -> ObservationResult<()> {
        match self.slot.get().and_then(|context| context.registry().ok()) {
            Some(registry) => registry.transition(|| self.swap_target(target)),
            None => self.swap_target(target),
        }
    }

    fn swap_target(&self, target: Option<Arc<dyn Observable<P>>>) -> ObservationResult<()> {
        let mut link = lock(&self.link);
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some((id, context)) = link.attached.take() {
            context.unregister_observer(id);
        }
        link.target = target;

        if link.observing {
            self.attach(&mut link)?;
        }
        debug!(key = %self.key, has_target = link.target.is_some(), "delegate target swapped");
        Ok(())
    }

    /// Publish a batch under this observable's own context.
    pub fn notify(&self, events: EventCollection<P>) -> bool {
        self.slot.notify(events)
    }

    fn attach(&self, link: &mut Link<P>) -> ObservationResult<()> {
        let (Some(target), Some(context)) = (link.target.clone(), self.slot.get()) else {
            return Ok(());
        };
        let observer = Arc::new(TargetObserver {
            target,
            context: Arc::clone(&context),
            source: self.key.clone(),
            generation: self.generation.load(Ordering::SeqCst),
            current: Arc::clone(&self.generation),
        });
        let id = context.register_observer(observer)?;
        link.attached = Some((id, context));
        Ok(())
    }
}

impl<P: Payload> Observable<P> for DelegatingObservable<P> {
    fn key(&self) -> ObservableKey {
        self.key.clone()
    }

    fn set_observation_context(&self, context: Option<Arc<ObservationContext<P>>>) {
        self.slot.set(context);
    }

    fn start_observation(&self) -> ObservationResult<()> {
        if !self.slot.is_bound() {
            debug!(key = %self.key, "start without context ignored");
            return Ok(());
        }
        let mut link = lock(&self.link);
        if link.observing {
            return Ok(());
        }
        link.observing = true;
        self.attach(&mut link)
    }

    fn stop_observation(&self) -> ObservationResult<()> {
        let mut link = lock(&self.link);
        link.observing = false;
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some((id, context)) = link.attached.take() {
            if !context.unregister_observer(id) {
                warn!(key = %self.key, observer = %id, "target observer was already gone");
            }
        }
        Ok(())
    }
}
