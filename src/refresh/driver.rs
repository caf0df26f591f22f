// Scheduled refresh driver.
// Keeps configured keys warm: one pass at startup, then one per schedule tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::SnapshotCache;

use super::schedule::RefreshSchedule;

/// Default pause between keys within one pass.
pub const DEFAULT_KEY_DELAY: Duration = Duration::from_secs(2);

pub const STARTUP_TRIGGER: &str = "startup";
pub const SCHEDULED_TRIGGER: &str = "scheduled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Stopped,
    Running,
}

/// Outcome counts for one refresh pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub trigger: String,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// Runs passes over the configured keys, one key at a time.
#[derive(Clone)]
struct PassRunner {
    cache: SnapshotCache,
    keys: Arc<[String]>,
    key_delay: Duration,
}

impl PassRunner {
    async fn run(&self, trigger: &str) -> PassReport {
        let started = Instant::now();
        let mut succeeded = 0;
        let mut failed = 0;

        tracing::info!(trigger, keys = self.keys.len(), "starting refresh pass");

        for (index, key) in self.keys.iter().enumerate() {
            match self.cache.refresh(key).await {
                Ok(entry) => {
                    succeeded += 1;
                    tracing::debug!(trigger, key = %key, generated_at = entry.generated_at, "refreshed");
                }
                Err(err) => {
                    failed += 1;
                    tracing::warn!(trigger, key = %key, error = %err, "refresh failed, continuing");
                }
            }

            if self.keys.len() > 1 && index + 1 < self.keys.len() {
                tokio::time::sleep(self.key_delay).await;
            }
        }

        let report = PassReport {
            trigger: trigger.to_string(),
            succeeded,
            failed,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            trigger,
            succeeded,
            failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "refresh pass finished"
        );
        report
    }

    /// Startup pass, then a pass at every schedule tick until aborted.
    async fn run_forever(self, schedule: RefreshSchedule) {
        self.run(STARTUP_TRIGGER).await;

        loop {
            let Some((next, wait)) = schedule.until_next(Utc::now()) else {
                tracing::warn!(
                    schedule = schedule.expression(),
                    "refresh schedule has no upcoming fire time, stopping"
                );
                return;
            };

            tracing::debug!(next = %next, wait_secs = wait.as_secs(), "next scheduled refresh");
            tokio::time::sleep(wait).await;
            self.run(SCHEDULED_TRIGGER).await;
        }
    }
}

/// Drives scheduled refreshes of a fixed key set. `Stopped -> Running -> Stopped`.
pub struct RefreshDriver {
    runner: PassRunner,
    schedule: RefreshSchedule,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshDriver {
    pub fn new(
        cache: SnapshotCache,
        keys: Vec<String>,
        schedule: RefreshSchedule,
        key_delay: Duration,
    ) -> Self {
        Self {
            runner: PassRunner {
                cache,
                keys: keys.into(),
                key_delay,
            },
            schedule,
            task: Mutex::new(None),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.runner.keys
    }

    pub fn state(&self) -> DriverState {
        match self.task.lock().as_ref() {
            Some(task) if !task.is_finished() => DriverState::Running,
            _ => DriverState::Stopped,
        }
    }

    /// Register the recurring trigger and fire the startup pass right away.
    ///
    /// Does nothing when no keys are configured or the driver already runs.
    pub fn start(&self) {
        if self.runner.keys.is_empty() {
            tracing::warn!("no usernames configured, scheduled refresh disabled");
            return;
        }

        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            tracing::warn!("refresh driver already running");
            return;
        }

        tracing::info!(
            keys = self.runner.keys.len(),
            schedule = self.schedule.expression(),
            timezone = %self.schedule.timezone(),
            "starting refresh driver"
        );

        let runner = self.runner.clone();
        let schedule = self.schedule.clone();
        *task = Some(tokio::spawn(runner.run_forever(schedule)));
    }

    /// Cancel the recurring trigger. Safe to call any number of times.
    ///
    /// Fetches already started run to completion and still update the cache.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            tracing::info!("refresh driver stopped");
        }
    }

    /// Refresh every configured key once, labelled with `trigger`.
    pub async fn run_pass(&self, trigger: &str) -> PassReport {
        self.runner.run(trigger).await
    }
}

impl Drop for RefreshDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
