//! Marshalling worker results onto the interactive thread.
//!
//! The worker never touches display objects. It sends [`UiEvent`]s over an
//! unbounded channel and the interactive thread applies them in order from
//! its event loop through [`InteractivePump`].

use crate::gate::HandoffGate;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use pdf_desktop_cache::CacheKey;
use std::sync::Arc;
use std::time::Duration;

/// Work the interactive thread runs on behalf of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    /// A texture for this key was inserted; consumers should re-query.
    Refresh(CacheKey),
    /// The worker may take its next request.
    ReleaseGate,
}

/// Worker-side end of the handoff channel. Sending never blocks.
#[derive(Debug, Clone)]
pub struct CommitSender {
    tx: Sender<UiEvent>,
}

impl CommitSender {
    pub fn refresh(&self, key: CacheKey) {
        self.send(UiEvent::Refresh(key));
    }

    pub fn release_gate(&self) {
        self.send(UiEvent::ReleaseGate);
    }

    fn send(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!(?event, "interactive side is gone, dropping event");
        }
    }
}

/// Interactive-side end of the handoff channel.
pub struct InteractivePump {
    rx: Receiver<UiEvent>,
    gate: Arc<HandoffGate>,
}

/// Create a connected sender and pump that open `gate` on [`UiEvent::ReleaseGate`].
pub fn handoff_channel(gate: Arc<HandoffGate>) -> (CommitSender, InteractivePump) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (CommitSender { tx }, InteractivePump { rx, gate })
}

impl InteractivePump {
    /// Apply every event queued right now. Returns how many were handled.
    pub fn pump<F>(&self, mut on_refresh: F) -> usize
    where
        F: FnMut(CacheKey),
    {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.apply(event, &mut on_refresh);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for the first event, then drain like
    /// [`InteractivePump::pump`].
    pub fn pump_timeout<F>(&self, timeout: Duration, mut on_refresh: F) -> usize
    where
        F: FnMut(CacheKey),
    {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.apply(event, &mut on_refresh);
                1 + self.pump(on_refresh)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Events waiting to be pumped.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    fn apply<F>(&self, event: UiEvent, on_refresh: &mut F)
    where
        F: FnMut(CacheKey),
    {
        match event {
            UiEvent::Refresh(key) => on_refresh(key),
            UiEvent::ReleaseGate => self.gate.release(),
        }
    }
}
