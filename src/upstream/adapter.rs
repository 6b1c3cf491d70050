use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::kernel::context::ObservationContext;
use crate::kernel::error::ObservationResult;
use crate::kernel::event::{Event, EventCollection};
use crate::kernel::key::ObservableKey;
use crate::kernel::lock;
use crate::kernel::observable::{ContextSlot, Observable};

use super::descriptor::{ChangeKind, Locator, NativeChange, NodeId, SubscriptionDescriptor};
use super::source::{ChangeSink, SubscriptionId, UpstreamSource};

/// Event payload produced by [`RepositoryObservable`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryChange {
    pub kind: ChangeKind,
    pub path: Locator,
    pub node_id: NodeId,
}

impl From<&NativeChange> for RepositoryChange {
    fn from(change: &NativeChange) -> Self {
        Self {
            kind: change.kind,
            path: change.path.clone(),
            node_id: change.node_id.clone(),
        }
    }
}

/// Observable backed by an upstream subscription.
///
/// Equal descriptors yield equal keys, so any number of instances watching
/// the same location share one upstream listener.
pub struct RepositoryObservable {
    key: ObservableKey,
    descriptor: SubscriptionDescriptor,
    source: Arc<dyn UpstreamSource>,
    slot: ContextSlot<RepositoryChange>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl RepositoryObservable {
    pub fn new(source: Arc<dyn UpstreamSource>, descriptor: SubscriptionDescriptor) -> Self {
        Self {
            key: descriptor.key(),
            descriptor,
            source,
            slot: ContextSlot::new(),
            subscription: Mutex::new(None),
        }
    }

    pub fn shared(source: Arc<dyn UpstreamSource>, descriptor: SubscriptionDescriptor) -> Arc<Self> {
        Arc::new(Self::new(source, descriptor))
    }

    pub fn descriptor(&self) -> &SubscriptionDescriptor {
        &self.descriptor
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.subscription).is_some()
    }

    fn sink(&self, context: &Arc<ObservationContext<RepositoryChange>>) -> ChangeSink {
        let key = self.key.clone();
        let context = Arc::downgrade(context);
        Arc::new(move |changes: Vec<NativeChange>| {
            let Some(context) = context.upgrade() else {
                return;
            };
            let events: EventCollection<RepositoryChange> = changes
                .iter()
                .map(|change| Event::payload(key.clone(), RepositoryChange::from(change)))
                .collect();
            context.notify_observers(events);
        })
    }
}

impl Observable<RepositoryChange> for RepositoryObservable {
    fn key(&self) -> ObservableKey {
        self.key.clone()
    }

    fn set_observation_context(&self, context: Option<Arc<ObservationContext<RepositoryChange>>>) {
        self.slot.set(context);
    }

    fn start_observation(&self) -> ObservationResult<()> {
        let Some(context) = self.slot.get() else {
            debug!(key = %self.key, "start without context ignored");
            return Ok(());
        };
        let mut subscription = lock(&self.subscription);
        if subscription.is_some() {
            return Ok(());
        }
        let id = self.source.subscribe(&self.descriptor, self.sink(&context))?;
        info!(key = %self.key, subscription = %id, "repository listener attached");
        *subscription = Some(id);
        Ok(())
    }

    fn stop_observation(&self) -> ObservationResult<()> {
        let Some(id) = lock(&self.subscription).take() else {
            return Ok(());
        };
        self.source.unsubscribe(id)?;
        info!(key = %self.key, subscription = %id, "repository listener detached");
        Ok(())
    }
}
