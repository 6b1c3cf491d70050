//! Observables built on top of other observables.

pub mod delegate;
pub mod property;

pub use delegate::DelegatingObservable;
pub use property::ObservablePropertyModel;
