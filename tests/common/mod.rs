#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vigil::kernel::{
    CallbackObserver, ContextSlot, Event, EventCollection, Observable, ObservableKey,
    ObservationContext, ObservationError, ObservationResult, Observer,
};

/// Observable that counts lifecycle calls and optionally journals them.
pub struct CountingObservable {
    key: ObservableKey,
    slot: ContextSlot<String>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: AtomicBool,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

impl CountingObservable {
    pub fn new(key: &str) -> Arc<Self> {
        Arc::new(Self::build(key, None))
    }

    pub fn with_journal(key: &str, journal: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self::build(key, Some(journal)))
    }

    fn build(key: &str, journal: Option<Arc<Mutex<Vec<String>>>>) -> Self {
        Self {
            key: ObservableKey::from(key),
            slot: ContextSlot::new(),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_start: AtomicBool::new(false),
            journal,
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn is_bound(&self) -> bool {
        self.slot.is_bound()
    }

    pub fn publish(&self, payloads: &[&str]) -> bool {
        let events: EventCollection<String> = payloads
            .iter()
            .map(|p| Event::payload(self.key.clone(), p.to_string()))
            .collect();
        self.slot.notify(events)
    }

    fn log(&self, entry: String) {
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(entry);
        }
    }
}

impl Observable<String> for CountingObservable {
    fn key(&self) -> ObservableKey {
        self.key.clone()
    }

    fn set_observation_context(&self, context: Option<Arc<ObservationContext<String>>>) {
        self.slot.set(context);
    }

    fn start_observation(&self) -> ObservationResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.log(format!("start:{}", self.key));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ObservationError::Upstream(format!("{} unavailable", self.key)));
        }
        Ok(())
    }

    fn stop_observation(&self) -> ObservationResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.log(format!("stop:{}", self.key));
        Ok(())
    }
}

/// Observer that records every payload it receives, in order.
pub fn recorder<O>(observable: &Arc<O>) -> (Arc<dyn Observer<String>>, Arc<Mutex<Vec<String>>>)
where
    O: Observable<String> + 'static,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let observer: Arc<dyn Observer<String>> =
        CallbackObserver::new(Arc::clone(observable), move |events: &EventCollection<String>| {
            assert!(!events.is_empty(), "observer saw an empty batch");
            sink.lock().unwrap().extend(events.payloads().cloned());
            Ok(())
        });
    (observer, seen)
}

pub fn seen(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap().clone()
}
