use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};

use super::thresholds::ThresholdWarning;

/// Event published by the performance monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A timer finished.
    Timing {
        operation: String,
        elapsed_ms: f64,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    },
    /// A threshold check failed.
    Threshold {
        warning: ThresholdWarning,
        at: DateTime<Utc>,
    },
}

/// A subscription stream for monitor events.
///
/// Producers never block on a slow subscriber: when the buffer is full new
/// events are dropped and counted by the monitor. Dropping the stream ends the
/// subscription; the monitor prunes it on the next publish.
#[derive(Debug)]
pub struct MonitorStream {
    rx: Receiver<MonitorEvent>,
}

impl MonitorStream {
    pub(crate) fn new(rx: Receiver<MonitorEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event, waiting at most `timeout`.
    ///
    /// Returns `None` on timeout or when the monitor has gone away.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<MonitorEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain every event already buffered.
    #[must_use]
    pub fn drain(&self) -> Vec<MonitorEvent> {
        self.rx.try_iter().collect()
    }
}
