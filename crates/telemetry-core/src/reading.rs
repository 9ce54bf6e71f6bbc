use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// One timestamped sample, produced fresh every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reading {
    pub timestamp_ms: u64,
    pub value: i64,
}

impl Reading {
    pub fn new(timestamp_ms: u64, value: i64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }

    /// Stamp `value` with the current wall-clock time.
    pub fn now(value: i64) -> Self {
        Self::new(unix_millis(), value)
    }

    /// Wire payload: ASCII `"<epoch-millis> <value>"`.
    pub fn to_payload(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.timestamp_ms, self.value)
    }
}

/// Milliseconds since the Unix epoch. A clock set before 1970 reads as 0.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Topic a device publishes to: `<base>/<device_id>`.
pub fn device_topic(base: &str, device_id: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), device_id)
}
