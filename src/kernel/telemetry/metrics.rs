use std::collections::VecDeque;

use super::event::TelemetryEvent;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub context_stats: ContextStats,
    pub lifecycle_stats: LifecycleStats,
    pub delivery_stats: DeliveryStats,
    pub registration_stats: RegistrationStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub created: u64,
    pub disposed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleStats {
    pub started: u64,
    pub stopped: u64,
    pub start_failures: u64,
    pub stop_failures: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryStats {
    pub batches: u64,
    pub events: u64,
    pub deliveries: u64,
    pub dropped_batches: u64,
    pub observer_failures: u64,
    pub avg_batch_size: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationStats {
    pub duplicates: u64,
    pub unknown_unregistrations: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();

    for event in events {
        match event {
            TelemetryEvent::ContextCreated { .. } => snap.context_stats.created += 1,
            TelemetryEvent::ContextDisposed { .. } => snap.context_stats.disposed += 1,
            TelemetryEvent::ObservationStarted { .. } => snap.lifecycle_stats.started += 1,
            TelemetryEvent::ObservationStopped { .. } => snap.lifecycle_stats.stopped += 1,
            TelemetryEvent::StartFailed { .. } => snap.lifecycle_stats.start_failures += 1,
            TelemetryEvent::StopFailed { .. } => snap.lifecycle_stats.stop_failures += 1,
            TelemetryEvent::BatchDelivered { events, observers, .. } => {
                snap.delivery_stats.batches += 1;
                snap.delivery_stats.events += *events as u64;
                snap.delivery_stats.deliveries += *observers as u64;
            }
            TelemetryEvent::BatchDropped => snap.delivery_stats.dropped_batches += 1,
            TelemetryEvent::ObserverFailed { .. } => snap.delivery_stats.observer_failures += 1,
            TelemetryEvent::DuplicateRegistration { .. } => snap.registration_stats.duplicates += 1,
            TelemetryEvent::UnknownUnregistration => {
                snap.registration_stats.unknown_unregistrations += 1
            }
        }
    }

    if snap.delivery_stats.batches > 0 {
        snap.delivery_stats.avg_batch_size =
            snap.delivery_stats.events as f64 / snap.delivery_stats.batches as f64;
    }

    snap
}
