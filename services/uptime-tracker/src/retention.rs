//! History retention: deterministic prune plus a probabilistic trigger
//!
//! The probabilistic trigger is meant to be called once per poll cycle. It
//! runs the prune with probability `1 / (cycles_per_day * day_count)`, which
//! averages out to one cleanup every `day_count` days without persisting a
//! "last run" timestamp. Gaps between runs are geometrically distributed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::error::{Result, UptimeError};
use crate::store::Store;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Outcome of a prune run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub deleted_count: u64,
    pub cutoff_timestamp: DateTime<Utc>,
    pub max_age_days: u32,
}

/// `now` minus `max_age_days`, or a prune error when that is out of range
fn cutoff_for(now: DateTime<Utc>, max_age_days: u32) -> Result<DateTime<Utc>> {
    chrono::Duration::try_days(i64::from(max_age_days))
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| {
            UptimeError::Prune(format!(
                "no cutoff exists {} days before {}",
                max_age_days,
                now.to_rfc3339()
            ))
        })
}

/// Prunes points older than a fixed age from the store
pub struct RetentionManager {
    store: Arc<dyn Store>,
    max_age_days: u32,
    poll_interval: Duration,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for RetentionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionManager")
            .field("max_age_days", &self.max_age_days)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl RetentionManager {
    /// `poll_interval` is the period at which [`run_if_due`](Self::run_if_due)
    /// will be called
    pub fn new(store: Arc<dyn Store>, max_age_days: u32, poll_interval: Duration) -> Self {
        Self {
            store,
            max_age_days,
            poll_interval,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Replace the random source, for reproducible scheduling
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn max_age_days(&self) -> u32 {
        self.max_age_days
    }

    /// Prune with the configured maximum age
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        self.delete_older_than_at(self.max_age_days, Utc::now())
            .await
    }

    /// Remove every point older than `max_age_days`, returning how many went
    pub async fn delete_older_than(&self, max_age_days: u32) -> Result<u64> {
        self.delete_older_than_at(max_age_days, Utc::now())
            .await
            .map(|report| report.deleted_count)
    }

    /// Remove every point older than `max_age_days` before `now`
    pub async fn delete_older_than_at(
        &self,
        max_age_days: u32,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport> {
        let cutoff = cutoff_for(now, max_age_days)?;
        tracing::info!(
            "Starting cleanup of points older than {} days (cutoff {})",
            max_age_days,
            cutoff.to_rfc3339()
        );

        match self.store.list_all().await {
            Ok(histories) => {
                for history in &histories {
                    let stale = history.count_older_than(cutoff);
                    if stale > 0 {
                        tracing::info!("Workload '{}': {} points to delete", history.id, stale);
                    } else {
                        tracing::debug!("Workload '{}': nothing to delete", history.id);
                    }
                }
            }
            Err(e) => tracing::warn!("Could not enumerate histories before prune: {}", e),
        }

        let deleted_count = self.store.prune_older_than(cutoff).await.map_err(|e| match e {
            UptimeError::Prune(_) => e,
            other => UptimeError::Prune(other.to_string()),
        })?;

        tracing::info!("Cleanup completed: deleted {} points", deleted_count);
        Ok(CleanupReport {
            deleted_count,
            cutoff_timestamp: cutoff,
            max_age_days,
        })
    }

    /// Chance that a single call of [`run_if_due`](Self::run_if_due) prunes
    pub fn cleanup_probability(&self, day_count: u32) -> f64 {
        let period = self.poll_interval.as_secs_f64();
        if period <= 0.0 {
            return 0.0;
        }
        let calls_per_day = SECONDS_PER_DAY / period;
        let probability = 1.0 / (calls_per_day * f64::from(day_count.max(1)));
        probability.clamp(0.0, 1.0)
    }

    /// Roll the dice for one poll cycle
    pub fn should_run(&self, day_count: u32) -> bool {
        let probability = self.cleanup_probability(day_count);
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.random_bool(probability)
    }

    /// Prune with the configured maximum age roughly once every `day_count`
    /// days. Failures are logged and reported as not run.
    pub async fn run_if_due(&self, day_count: u32) -> bool {
        if !self.should_run(day_count) {
            return false;
        }

        tracing::info!(
            "Scheduled cleanup running (about every {} day(s))",
            day_count
        );
        match self.cleanup().await {
            Ok(report) => {
                tracing::info!(
                    "Scheduled cleanup removed {} old points",
                    report.deleted_count
                );
                true
            }
            Err(e) => {
                tracing::warn!("Scheduled cleanup failed: {}", e);
                false
            }
        }
    }
}
