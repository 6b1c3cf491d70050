//! Registry telemetry
//!
//! # SAFETY INVARIANT
//! Telemetry is a READ-ONLY side-effect layer.
//! Nothing in the registry or its contexts may branch on it.
//!
//! # PRIVACY INVARIANT
//! Telemetry events carry observable keys and counts only, never event
//! payloads.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::TelemetryEvent;
pub use metrics::{compute_snapshot, TelemetrySnapshot};
pub use recorder::TelemetryRecorder;
