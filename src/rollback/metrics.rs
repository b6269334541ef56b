// ABOUTME: In-process rollback metrics shared by every engine in the process.
// ABOUTME: Success/failure counts per mode plus the most recent duration and failure.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::RollbackMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModeCounts {
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub by_mode: BTreeMap<RollbackMode, ModeCounts>,
    pub last_duration: Option<Duration>,
    pub last_failure_reason: Option<String>,
}

impl MetricsSnapshot {
    pub fn total_successes(&self) -> u64 {
        self.by_mode.values().map(|c| c.successes).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.by_mode.values().map(|c| c.failures).sum()
    }
}

#[derive(Debug, Default)]
pub struct RollbackMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl RollbackMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, mode: RollbackMode, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.by_mode.entry(mode).or_default().successes += 1;
        inner.last_duration = Some(duration);
    }

    pub fn record_failure(&self, mode: RollbackMode, duration: Duration, reason: &str) {
        let mut inner = self.inner.lock();
        inner.by_mode.entry(mode).or_default().failures += 1;
        inner.last_duration = Some(duration);
        inner.last_failure_reason = Some(reason.to_string());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().clone()
    }
}
