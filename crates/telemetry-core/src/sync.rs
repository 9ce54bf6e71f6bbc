use serde::Serialize;
use std::sync::{Mutex, PoisonError};

/// Lifecycle of the simulation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    Created,
    Connected,
    Running,
    Disconnecting,
    Terminated,
}

/// Counters and last reading as seen after the most recent tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoopSnapshot {
    pub state: LoopState,
    pub connected: bool,
    pub ticks: u64,
    pub confirmed: u64,
    pub delivery_timeouts: u64,
    pub publish_errors: u64,
    pub connect_failures: u64,
    pub last_value: i64,
    pub last_timestamp_ms: u64,
    pub last_publish_us: u64,
}

/// Hand-off of [`LoopSnapshot`]s from the loop to observers such as the
/// metrics updater. The lock is only ever held for a copy.
pub struct SnapshotExchange {
    latest: Mutex<LoopSnapshot>,
}

impl SnapshotExchange {
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(LoopSnapshot::default()),
        }
    }

    /// Called by the loop thread after every state change.
    pub fn publish(&self, snapshot: LoopSnapshot) {
        // A snapshot is plain data; a panicked holder cannot leave it torn.
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn read(&self) -> LoopSnapshot {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SnapshotExchange {
    fn default() -> Self {
        Self::new()
    }
}
