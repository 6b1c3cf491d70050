use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::kernel::error::ObservationResult;

use super::descriptor::{NativeChange, SubscriptionDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback a source invokes with each non-empty, ordered batch of matching
/// changes. May be invoked from any thread.
pub type ChangeSink = Arc<dyn Fn(Vec<NativeChange>) + Send + Sync>;

/// Contract every change-notification source fulfils.
pub trait UpstreamSource: Send + Sync {
    /// Start delivering changes matching `descriptor` to `sink`.
    fn subscribe(
        &self,
        descriptor: &SubscriptionDescriptor,
        sink: ChangeSink,
    ) -> ObservationResult<SubscriptionId>;

    /// Stop a subscription. Unknown ids are not an error.
    fn unsubscribe(&self, id: SubscriptionId) -> ObservationResult<()>;
}
