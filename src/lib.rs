pub mod config;
pub mod kernel;
pub mod model;
pub mod upstream;

// Re-export the registration surface for convenient access
pub use config::RegistryConfig;
pub use kernel::{
    CallbackObserver, Event, EventCollection, EventKind, KeyedObservable, Observable,
    ObservableKey, ObservationContext, ObservationError, ObservationResult, ObservationSession,
    Observer, ObserverId, ObserverRegistry, Reactor,
};
