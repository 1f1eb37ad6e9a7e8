//! Single-slot handoff gate between the worker and the interactive thread.
//!
//! The gate starts locked. The worker takes it before every request; the
//! interactive thread opens it once at startup and once for every commit it
//! has finished applying. At most one cross-thread commit is therefore ever in
//! flight.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct HandoffGate {
    state: Mutex<GateState>,
    opened: Condvar,
}

impl HandoffGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate. Opening an already open gate has no extra effect.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if state.open {
            tracing::trace!("handoff gate released while already open");
        }
        state.open = true;
        drop(state);
        self.opened.notify_one();
    }

    /// Wait for the gate to open and lock it again.
    ///
    /// Returns `false` when the gate was closed for shutdown.
    pub fn acquire(&self) -> bool {
        let mut state = self.state.lock();
        while !state.open && !state.closed {
            self.opened.wait(&mut state);
        }
        Self::take(&mut state)
    }

    /// Like [`HandoffGate::acquire`] but gives up after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.open && !state.closed {
            self.opened.wait_for(&mut state, timeout);
        }
        Self::take(&mut state)
    }

    fn take(state: &mut GateState) -> bool {
        if state.closed || !state.open {
            return false;
        }
        state.open = false;
        true
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Wake any waiter for shutdown; further acquires fail.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.opened.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
