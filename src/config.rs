use serde::{Deserialize, Serialize};

use crate::kernel::error::{ObservationError, ObservationResult};

/// Default reactor cadence
pub const TICK_MS: u64 = 20;

/// Default telemetry ring buffer size
pub const TELEMETRY_CAPACITY: usize = 10_000;

/// Registry and reactor settings.
///
/// Missing JSON fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Reactor cadence: pending events are applied once per tick
    pub tick_ms: u64,
    /// Upper bound on batches applied per `process_pending` call (0 = drain all)
    pub max_batches_per_tick: usize,
    /// Telemetry ring buffer size
    pub telemetry_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            tick_ms: TICK_MS,
            max_batches_per_tick: 0,
            telemetry_capacity: TELEMETRY_CAPACITY,
        }
    }
}

impl RegistryConfig {
    pub fn from_json_str(raw: &str) -> ObservationResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ObservationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ObservationResult<()> {
        if self.tick_ms == 0 {
            return Err(ObservationError::InvalidConfig("tick_ms must be non-zero".into()));
        }
        if self.telemetry_capacity == 0 {
            return Err(ObservationError::InvalidConfig(
                "telemetry_capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
