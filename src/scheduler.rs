//! Periodic tasks driving a [`Dashboard`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::MarketplaceApi;
use crate::config::ScheduleConfig;
use crate::dashboard::{Dashboard, RefreshOutcome};

/// Growth factor applied to the refresh delay after an unsuccessful cycle.
const BACKOFF_FACTOR: f64 = 1.5;

/// Delay before the next refresh: back to `base` after a success, otherwise
/// `current * 1.5` capped at `max`.
pub fn next_refresh_delay(
    current: Duration,
    base: Duration,
    max: Duration,
    outcome: RefreshOutcome,
) -> Duration {
    if outcome.is_success() {
        base
    } else {
        current.mul_f64(BACKOFF_FACTOR).min(max.max(base))
    }
}

/// Owns the spawned timer tasks. Dropping it closes the shutdown channel, so
/// every task exits at its next wakeup; only [`Scheduler::stop`] waits for them.
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    /// Spawn every periodic task. The first refresh runs immediately; the
    /// other timers first fire one period after start.
    pub fn start<A: MarketplaceApi>(dashboard: Arc<Dashboard<A>>, schedule: ScheduleConfig) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let mut tasks = Vec::new();

        {
            let dashboard = dashboard.clone();
            let base = schedule.refresh_interval;
            let max = schedule.max_refresh_interval;
            let mut rx = rx.clone();
            tasks.push((
                "refresh",
                tokio::spawn(async move {
                    let mut delay = base;
                    loop {
                        let outcome = dashboard.refresh().await;
                        let next = next_refresh_delay(delay, base, max, outcome);
                        if next != delay {
                            debug!(?outcome, delay_ms = next.as_millis() as u64, "Refresh interval adjusted");
                        }
                        delay = next;
                        tokio::select! {
                            biased;
                            _ = rx.changed() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }),
            ));
        }

        let d = dashboard.clone();
        tasks.push(periodic("live_tick", schedule.live_tick_interval, rx.clone(), move || {
            let d = d.clone();
            async move { d.tick_live() }
        }));

        let d = dashboard.clone();
        tasks.push(periodic("health_check", schedule.health_check_interval, rx.clone(), move || {
            let d = d.clone();
            async move {
                d.health_check().await;
            }
        }));

        let d = dashboard.clone();
        tasks.push(periodic("cache_sweep", schedule.cache_sweep_interval, rx.clone(), move || {
            let d = d.clone();
            async move {
                let removed = d.sweep_cache();
                if removed > 0 {
                    debug!(removed, "Expired cache entries removed");
                }
            }
        }));

        let d = dashboard.clone();
        tasks.push(periodic("error_analysis", schedule.error_analysis_interval, rx.clone(), move || {
            let d = d.clone();
            async move {
                d.analyze_errors();
            }
        }));

        let d = dashboard;
        tasks.push(periodic("reconnect", schedule.reconnect_interval, rx, move || {
            let d = d.clone();
            async move {
                d.attempt_reconnection().await;
            }
        }));

        info!(tasks = tasks.len(), "Scheduler started");
        Self { shutdown, tasks }
    }

    /// Signal every task and wait for them. A cycle already in progress is
    /// allowed to finish; nothing renders afterwards.
    pub async fn stop(self) {
        if self.shutdown.send(true).is_err() {
            debug!("All scheduler tasks already gone");
        }
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

fn periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) -> (&'static str, JoinHandle<()>)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => job().await,
            }
        }
        debug!(task = name, "Scheduler task exiting");
    });
    (name, handle)
}
