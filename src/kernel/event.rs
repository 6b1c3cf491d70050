use std::fmt;

use super::key::ObservableKey;

/// Bound every event payload satisfies. Blanket-implemented.
pub trait Payload: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> Payload for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind<P> {
    /// Something about the source changed; no further detail.
    /// Delegating observables and property models publish this.
    Changed,
    /// Adapter-specific payload (e.g. a repository change)
    Payload(P),
}

/// A single event, tagged with the observable that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<P> {
    pub source: ObservableKey,
    pub kind: EventKind<P>,
}

impl<P> Event<P> {
    pub fn changed(source: ObservableKey) -> Self {
        Self { source, kind: EventKind::Changed }
    }

    pub fn payload(source: ObservableKey, payload: P) -> Self {
        Self { source, kind: EventKind::Payload(payload) }
    }

    pub fn source(&self) -> &ObservableKey {
        &self.source
    }

    pub fn as_payload(&self) -> Option<&P> {
        match &self.kind {
            EventKind::Payload(p) => Some(p),
            EventKind::Changed => None,
        }
    }
}

impl<P: Clone> Event<P> {
    /// Same event kind, re-attributed to another source.
    pub fn retarget(&self, source: ObservableKey) -> Self {
        Self { source, kind: self.kind.clone() }
    }
}

/// Ordered, append-only batch of events.
///
/// Built once per notification burst and handed to observers by reference,
/// so observers never see it change. Empty collections are never delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCollection<P> {
    events: Vec<Event<P>>,
}

impl<P> EventCollection<P> {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: Event<P>) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event<P>> {
        self.events.iter()
    }

    /// Payloads in delivery order, skipping `Changed` events
    pub fn payloads(&self) -> impl Iterator<Item = &P> {
        self.events.iter().filter_map(Event::as_payload)
    }
}

impl<P> Default for EventCollection<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> From<Event<P>> for EventCollection<P> {
    fn from(event: Event<P>) -> Self {
        Self { events: vec![event] }
    }
}

impl<P> FromIterator<Event<P>> for EventCollection<P> {
    fn from_iter<I: IntoIterator<Item = Event<P>>>(iter: I) -> Self {
        Self { events: iter.into_iter().collect() }
    }
}

impl<'a, P> IntoIterator for &'a EventCollection<P> {
    type Item = &'a Event<P>;
    type IntoIter = std::slice::Iter<'a, Event<P>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl<P> IntoIterator for EventCollection<P> {
    type Item = Event<P>;
    type IntoIter = std::vec::IntoIter<Event<P>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}
