use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{ApiError, ErrorKind, Severity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub context: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverityCounts {
    pub info: u64,
    pub warning: u64,
    pub critical: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPattern {
    pub kind: ErrorKind,
    pub occurrences: usize,
}

impl ErrorPattern {
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Network | ErrorKind::Timeout)
    }
}

struct Inner {
    records: VecDeque<ErrorRecord>,
    counts: SeverityCounts,
}

/// Bounded history of classified errors with rolling-window pattern detection.
pub struct ErrorLog {
    inner: Mutex<Inner>,
    capacity: usize,
    window_ms: u64,
    threshold: usize,
}

impl ErrorLog {
    pub fn new(capacity: usize, window: Duration, threshold: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: VecDeque::with_capacity(capacity.min(1_024)),
                counts: SeverityCounts::default(),
            }),
            capacity: capacity.max(1),
            window_ms: window.as_millis() as u64,
            threshold,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, err: &ApiError, context: &str, now: u64) -> Severity {
        let severity = err.severity();
        let message = err.to_string();
        match severity {
            Severity::Critical => error!(context, error = %message, "Critical error"),
            Severity::Warning => warn!(context, error = %message, "Recoverable error"),
            Severity::Info => info!(context, error = %message, "Request failed"),
        }

        let mut inner = self.lock();
        match severity {
            Severity::Critical => inner.counts.critical += 1,
            Severity::Warning => inner.counts.warning += 1,
            Severity::Info => inner.counts.info += 1,
        }
        if inner.records.len() == self.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(ErrorRecord {
            kind: err.kind(),
            severity,
            message,
            context: context.to_string(),
            timestamp: now,
        });
        severity
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn counts(&self) -> SeverityCounts {
        self.lock().counts
    }

    pub fn recent(&self, limit: usize) -> Vec<ErrorRecord> {
        let inner = self.lock();
        inner
            .records
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn last_at(&self) -> Option<u64> {
        self.lock().records.back().map(|r| r.timestamp)
    }

    /// Error kinds seen more than `threshold` times within the window ending at `now`.
    pub fn patterns_at(&self, now: u64) -> Vec<ErrorPattern> {
        let inner = self.lock();
        let mut groups: HashMap<ErrorKind, usize> = HashMap::new();
        for record in inner
            .records
            .iter()
            .filter(|r| now.saturating_sub(r.timestamp) < self.window_ms)
        {
            *groups.entry(record.kind).or_default() += 1;
        }
        let mut patterns: Vec<ErrorPattern> = groups
            .into_iter()
            .filter(|(_, n)| *n > self.threshold)
            .map(|(kind, occurrences)| ErrorPattern { kind, occurrences })
            .collect();
        patterns.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        patterns
    }
}
