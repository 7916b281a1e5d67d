use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure: Option<u64>,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<u64>,
}

/// Trips after `threshold` consecutive failures and stays open for `cooldown`
/// before letting a single trial request through.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: u32,
    cooldown_ms: u64,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
            threshold: threshold.max(1),
            cooldown_ms: cooldown.as_millis() as u64,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.lock();
        BreakerStatus {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure: inner.last_failure,
        }
    }

    /// Whether a live call may go out at `now`. Moves Open to HalfOpen
    /// once the cooldown since the last failure has fully elapsed.
    pub fn allow_request_at(&self, now: u64) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let since = inner
                    .last_failure
                    .map(|t| now.saturating_sub(t))
                    .unwrap_or(u64::MAX);
                if since >= self.cooldown_ms {
                    inner.state = CircuitState::HalfOpen;
                    info!("Circuit half-open, allowing a trial request");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(previous = ?inner.state, "Circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    pub fn record_failure_at(&self, now: u64) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(now);
        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.threshold => {
                inner.state = CircuitState::Open;
                warn!(failures = inner.failure_count, "Circuit opened");
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                warn!("Trial request failed, circuit re-opened");
            }
            _ => {}
        }
    }

    /// Open the circuit regardless of the failure count.
    pub fn force_open_at(&self, now: u64) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            warn!(failures = inner.failure_count, "Circuit forced open");
        }
        inner.state = CircuitState::Open;
        inner.last_failure = Some(now);
    }
}
