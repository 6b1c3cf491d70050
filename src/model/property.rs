use std::sync::{Arc, RwLock};

use crate::kernel::context::ObservationContext;
use crate::kernel::error::ObservationResult;
use crate::kernel::event::{Event, Payload};
use crate::kernel::key::ObservableKey;
use crate::kernel::observable::Observable;

use super::delegate::DelegatingObservable;

/// An observable value holder.
///
/// Setting the value publishes `Changed` under the model's key. When it
/// follows a target (e.g. the node the property belongs to), target events
/// are re-published under the model's key as well.
pub struct ObservablePropertyModel<T, P: Payload> {
    value: RwLock<T>,
    delegate: DelegatingObservable<P>,
}

impl<T, P> ObservablePropertyModel<T, P>
where
    T: Clone + Send + Sync,
    P: Payload,
{
    pub fn new(key: impl Into<ObservableKey>, value: T) -> Self {
        Self {
            value: RwLock::new(value),
            delegate: DelegatingObservable::new(key, None),
        }
    }

    pub fn following(key: impl Into<ObservableKey>, value: T, target: Arc<dyn Observable<P>>) -> Self {
        Self {
            value: RwLock::new(value),
            delegate: DelegatingObservable::new(key, Some(target)),
        }
    }

    pub fn get(&self) -> T {
        match self.value.read() {
            Ok(value) => value.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the value. Returns whether a change event was queued
    /// (false while nobody observes the model).
    pub fn set(&self, value: T) -> bool {
        match self.value.write() {
            Ok(mut slot) => *slot = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
        self.delegate.notify(Event::changed(self.delegate.key()).into())
    }

    pub fn set_target(&self, target: Option<Arc<dyn Observable<P>>>) -> ObservationResult<()> {
        self.delegate.set_target(target)
    }

    pub fn target(&self) -> Option<Arc<dyn Observable<P>>> {
        self.delegate.target()
    }
}

impl<T, P> Observable<P> for ObservablePropertyModel<T, P>
where
    T: Clone + Send + Sync,
    P: Payload,
{
    fn key(&self) -> ObservableKey {
        self.delegate.key()
    }

    fn set_observation_context(&self, context: Option<Arc<ObservationContext<P>>>) {
        self.delegate.set_observation_context(context);
    }

    fn start_observation(&self) -> ObservationResult<()> {
        self.delegate.start_observation()
    }

    fn stop_observation(&self) -> ObservationResult<()> {
        self.delegate.stop_observation()
    }
}
