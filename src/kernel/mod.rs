//! Observation kernel: observables, observers, contexts and the registry
//! that ties their lifecycles together.

pub mod context;
pub mod error;
pub mod event;
mod gate;
pub mod key;
pub mod observable;
pub mod observer;
pub mod reactor;
pub mod registry;
pub mod session;
pub mod telemetry;
pub mod time;

pub use context::ObservationContext;
pub use error::{ObservationError, ObservationResult};
pub use event::{Event, EventCollection, EventKind, Payload};
pub use key::ObservableKey;
pub use observable::{ContextSlot, KeyedObservable, Observable};
pub use observer::{CallbackObserver, Observer, ObserverId};
pub use reactor::Reactor;
pub use registry::{DeliveryReport, ObserverRegistry, RefreshSignal};
pub use session::ObservationSession;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock, recovering from poisoning. Callbacks never run under these locks.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
