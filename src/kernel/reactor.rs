use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::event::Payload;
use super::registry::{DeliveryReport, ObserverRegistry};
use super::time::Tick;

/// Session pump: applies queued events to observers on a fixed cadence.
///
/// Upstream sources queue batches from their own threads; the reactor is
/// the single point where those batches reach observer callbacks.
pub struct Reactor<P: Payload> {
    pub registry: ObserverRegistry<P>,
    pub tick: Tick,
    tick_ms: u64,
    last_delivery: Option<Tick>,
}

impl<P: Payload> Reactor<P> {
    pub fn new(registry: ObserverRegistry<P>) -> Self {
        let tick_ms = registry.config().tick_ms.max(1);
        Self {
            registry,
            tick: Tick::new(),
            tick_ms,
            last_delivery: None,
        }
    }

    /// One step: advance the tick, then apply pending events.
    ///
    /// The tick is advanced at the VERY START of the step, so everything
    /// delivered here belongs to the new tick.
    pub fn tick_step(&mut self) -> DeliveryReport {
        self.tick = self.tick.next();
        let report = self.registry.process_pending();

        if !report.is_idle() {
            let quiet = self.last_delivery.map(|t| self.tick.since(t)).unwrap_or(0);
            debug!(
                tick = %self.tick,
                batches = report.batches,
                deliveries = report.deliveries,
                failures = report.failures,
                dropped = report.dropped,
                quiet_ticks = quiet,
                "pending events applied"
            );
            self.last_delivery = Some(self.tick);
        }

        report
    }

    /// Last tick that applied at least one batch
    pub fn last_delivery(&self) -> Option<Tick> {
        self.last_delivery
    }

    /// Async driver loop. Runs until `shutdown` is cancelled, applies what is
    /// still queued, then stops the registry.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!("Reactor started. Tick: {}ms", self.tick_ms);

        let mut cadence = interval(Duration::from_millis(self.tick_ms));
        cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = cadence.tick() => {
                    self.tick_step();
                }
            }
        }

        self.tick_step();
        self.registry.stop();
        info!(tick = %self.tick, "Reactor stopped");
    }
}
