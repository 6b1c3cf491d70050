//! Upstream change sources and the adapter that turns their native change
//! batches into observation events.

pub mod adapter;
pub mod descriptor;
pub mod repository;
pub mod source;

pub use adapter::{RepositoryChange, RepositoryObservable};
pub use descriptor::{
    ChangeKind, ChangeKinds, Locator, NativeChange, NodeId, SubscriptionDescriptor, TypeName,
};
pub use repository::InMemoryRepository;
pub use source::{ChangeSink, SubscriptionId, UpstreamSource};
