use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use super::lock;

/// Reentrant, thread-owned lock serializing observation lifecycle
/// transitions.
///
/// Lifecycle hooks run while the gate is held and may re-enter the registry
/// on the same thread (a delegate registering its target observer). Other
/// threads wait until the outermost transition completes.
#[derive(Debug, Default)]
pub(crate) struct LifecycleGate {
    owner: Mutex<Option<(ThreadId, usize)>>,
    released: Condvar,
}

impl LifecycleGate {
    pub(crate) fn enter(&self) -> GateGuard<'_> {
        let me = thread::current().id();
        let mut owner = lock(&self.owner);
        loop {
            match *owner {
                None => {
                    *owner = Some((me, 1));
                    break;
                }
                Some((holder, ref mut depth)) if holder == me => {
                    *depth += 1;
                    break;
                }
                Some(_) => {}
            }
            owner = self
                .released
                .wait(owner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        GateGuard { gate: self }
    }
}

pub(crate) struct GateGuard<'a> {
    gate: &'a LifecycleGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut owner = lock(&self.gate.owner);
        if let Some((_, depth)) = owner.as_mut() {
            *depth -= 1;
            if *depth == 0 {
                *owner = None;
                self.gate.released.notify_all();
            }
        }
    }
}
