use crate::model::{ConnectionStatus, RawReading, Reading};
use std::collections::VecDeque;
use tokio::sync::watch;

/// Rolling window size for live history. Item-count cap, not a time window.
pub const HISTORY_CAP: usize = 100;

/// Snapshot of everything the store owns.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    pub latest: Option<Reading>,
    /// Chronological ascending, capped at [`HISTORY_CAP`] by `set_latest_data`.
    pub history: VecDeque<Reading>,
    pub status: ConnectionStatus,
}

/// Single source of truth for live and recent telemetry.
///
/// Explicitly constructed and shared by handle (`Arc<TelemetryStore>`), never
/// a global. The setters below are the only mutation entry points; each runs
/// to completion before yielding, so the two async producers (stream callback
/// and bootstrap fetch) need no further synchronization. Readers subscribe
/// through a watch channel and are notified on every mutation.
#[derive(Debug)]
pub struct TelemetryStore {
    state: watch::Sender<MonitorState>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(MonitorState::default());
        Self { state }
    }

    /// Reactive handle for consumers. The receiver sees every state change.
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Clone of the current state for one-off reads.
    pub fn snapshot(&self) -> MonitorState {
        self.state.borrow().clone()
    }

    /// Appends a live reading to history, evicting the oldest entries past
    /// the cap, and makes it the latest reading.
    pub fn set_latest_data(&self, reading: Reading) {
        self.state.send_modify(|s| {
            s.history.push_back(reading.clone());
            while s.history.len() > HISTORY_CAP {
                s.history.pop_front();
            }
            s.latest = Some(reading);
        });
    }

    /// Replaces history wholesale with a normalized bootstrap batch.
    ///
    /// The caller supplies the batch in chronological ascending order (the
    /// history endpoint returns newest-first, so the loader reverses before
    /// calling). `latest` is only filled in when still unset, falling back to
    /// the most recent batch element: a bootstrap snapshot must never clobber
    /// a newer live reading.
    pub fn set_history(&self, batch: Vec<RawReading>) {
        let normalized: VecDeque<Reading> =
            batch.into_iter().map(RawReading::normalize).collect();
        self.state.send_modify(|s| {
            if s.latest.is_none() {
                s.latest = normalized.back().cloned();
            }
            s.history = normalized;
        });
    }

    /// Unconditional overwrite, last writer wins.
    pub fn set_status(&self, status: ConnectionStatus) {
        self.state.send_modify(|s| s.status = status);
    }

    /// Empties history; `latest` and `status` are untouched.
    pub fn clear_history(&self) {
        self.state.send_modify(|s| s.history.clear());
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}
