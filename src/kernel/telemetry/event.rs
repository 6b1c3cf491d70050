use serde::{Deserialize, Serialize};

use crate::kernel::key::ObservableKey;

// Allowed: keys, counts, lifecycle transitions
// Forbidden: event payloads, observer state

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    ContextCreated { key: ObservableKey },
    ContextDisposed { key: ObservableKey },

    ObservationStarted { key: ObservableKey },
    ObservationStopped { key: ObservableKey },
    StartFailed { key: ObservableKey },
    StopFailed { key: ObservableKey },

    BatchDelivered {
        key: ObservableKey,
        events: usize,
        observers: usize,
    },
    /// Batch queued for a context that was disposed before it was applied
    BatchDropped,
    ObserverFailed { key: ObservableKey },

    DuplicateRegistration { key: ObservableKey },
    UnknownUnregistration,
}
