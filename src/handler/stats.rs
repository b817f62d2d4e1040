use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for handler activity
#[derive(Debug, Default)]
pub struct HandlerStats {
    /// Actions processed
    pub actions_processed: AtomicU64,
    /// Hardware notifications processed
    pub hardware_events: AtomicU64,
    /// Actions dropped because the camera was in the wrong state
    pub rejected_commands: AtomicU64,
    /// Actions whose processing failed
    pub failures: AtomicU64,
}

impl HandlerStats {
    pub(crate) fn record_action(&self) {
        self.actions_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hardware_event(&self) {
        self.hardware_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics as a snapshot
    pub fn snapshot(&self) -> HandlerStatsSnapshot {
        HandlerStatsSnapshot {
            actions_processed: self.actions_processed.load(Ordering::Relaxed),
            hardware_events: self.hardware_events.load(Ordering::Relaxed),
            rejected_commands: self.rejected_commands.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of handler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandlerStatsSnapshot {
    pub actions_processed: u64,
    pub hardware_events: u64,
    pub rejected_commands: u64,
    pub failures: u64,
}
