use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::event::{EventCollection, Payload};
use super::observable::Observable;

/// Handle returned by registration; the only way to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A consumer interested in exactly one observable.
///
/// `observable()` must keep returning an observable with the same key for
/// as long as the observer is registered.
pub trait Observer<P: Payload>: Send + Sync {
    fn observable(&self) -> Arc<dyn Observable<P>>;

    /// Called with a non-empty batch, on the thread that applies pending
    /// events. An error is logged and does not affect other observers.
    fn on_events(&self, events: &EventCollection<P>) -> anyhow::Result<()>;
}

/// Instance address of an observer, ignoring vtable metadata.
pub(crate) fn observer_addr<P: Payload>(observer: &Arc<dyn Observer<P>>) -> usize {
    Arc::as_ptr(observer) as *const () as usize
}

/// Closure-backed observer.
pub struct CallbackObserver<P: Payload, F> {
    observable: Arc<dyn Observable<P>>,
    callback: F,
}

impl<P, F> CallbackObserver<P, F>
where
    P: Payload,
    F: Fn(&EventCollection<P>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    pub fn new<O>(observable: Arc<O>, callback: F) -> Arc<Self>
    where
        O: Observable<P> + 'static,
    {
        let observable: Arc<dyn Observable<P>> = observable;
        Self::from_dyn(observable, callback)
    }

    pub fn from_dyn(observable: Arc<dyn Observable<P>>, callback: F) -> Arc<Self> {
        Arc::new(Self { observable, callback })
    }
}

impl<P, F> Observer<P> for CallbackObserver<P, F>
where
    P: Payload,
    F: Fn(&EventCollection<P>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn observable(&self) -> Arc<dyn Observable<P>> {
        Arc::clone(&self.observable)
    }

    fn on_events(&self, events: &EventCollection<P>) -> anyhow::Result<()> {
        (self.callback)(events)
    }
}
