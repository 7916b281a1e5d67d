use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_latency_ms: u64,
    pub average_ms: f64,
    pub peak_ms: u64,
    pub last_ms: u64,
}

impl LatencySnapshot {
    /// Percentage of successful calls; 100 before any call is made.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            100.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64 * 100.0
        }
    }
}

/// Per-client request accounting. Each call is folded in under one lock.
#[derive(Default)]
pub struct LatencyTracker {
    inner: Mutex<LatencySnapshot>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, latency: Duration, success: bool) -> LatencySnapshot {
        let ms = latency.as_millis() as u64;
        let mut s = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        s.total_requests += 1;
        if success {
            s.successful_requests += 1;
        } else {
            s.failed_requests += 1;
        }
        s.total_latency_ms += ms;
        s.average_ms = s.total_latency_ms as f64 / s.total_requests as f64;
        s.peak_ms = s.peak_ms.max(ms);
        s.last_ms = ms;
        *s
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
