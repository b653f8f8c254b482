//! Poll-and-persist pipeline: snapshot, allowlist join, append, aggregate

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UptimeError};
use crate::registry::Registry;
use crate::retention::RetentionManager;
use crate::runtime::{ContainerState, SnapshotSource};
use crate::stats::{compute_stats, UptimeStats};
use crate::store::{ObservationPoint, Store};

/// Status text reported for tracked workloads missing from the snapshot
pub const OFFLINE_STATUS_TEXT: &str = "Offline";

/// Current status of one tracked workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub id: String,
    pub display_name: String,
    pub is_online: bool,
    pub status_text: String,
    pub last_checked: DateTime<Utc>,
    pub stats: UptimeStats,
}

/// One poll cycle over the tracked workloads
pub struct Pipeline {
    registry: Arc<Registry>,
    source: Arc<dyn SnapshotSource>,
    store: Arc<dyn Store>,
    retention: Option<Arc<RetentionManager>>,
    cleanup_every_days: u32,
}

impl Pipeline {
    pub fn new(
        registry: Arc<Registry>,
        source: Arc<dyn SnapshotSource>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            registry,
            source,
            store,
            retention: None,
            cleanup_every_days: 1,
        }
    }

    /// Give every run a chance to trigger the scheduled cleanup
    pub fn with_retention(mut self, retention: Arc<RetentionManager>, every_days: u32) -> Self {
        self.retention = Some(retention);
        self.cleanup_every_days = every_days;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn run(&self) -> Result<Vec<ServiceStatus>> {
        self.run_at(Utc::now()).await
    }

    /// Run one cycle as of `now`.
    ///
    /// Fails only when the snapshot cannot be taken, in which case nothing is
    /// written. Store failures degrade the result (zeroed stats) instead.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<Vec<ServiceStatus>> {
        let snapshot = self.source.list_containers().await.map_err(|e| match e {
            UptimeError::SnapshotUnavailable(_) => e,
            other => UptimeError::SnapshotUnavailable(other.to_string()),
        })?;

        let by_id: HashMap<&str, &ContainerState> =
            snapshot.iter().map(|c| (c.id.as_str(), c)).collect();

        let persist = self.store.healthy();
        if !persist {
            tracing::warn!("History store unavailable, reporting live status only");
        }

        let mut statuses = Vec::with_capacity(self.registry.len());
        let mut write_failures = 0usize;

        for workload in self.registry.list() {
            let (is_online, status_text) = match by_id.get(workload.id.as_str()) {
                Some(container) => (container.running, container.status_text.clone()),
                None => (false, OFFLINE_STATUS_TEXT.to_string()),
            };

            let stats = if persist {
                let point = ObservationPoint {
                    timestamp: now,
                    is_online,
                };
                if let Err(e) = self.store.append_point(&workload.id, point).await {
                    tracing::warn!("Failed to record point for '{}': {}", workload.id, e);
                    write_failures += 1;
                }
                self.stats_for(&workload.id, now).await
            } else {
                UptimeStats::empty()
            };

            statuses.push(ServiceStatus {
                id: workload.id.clone(),
                display_name: workload.display_name.clone(),
                is_online,
                status_text,
                last_checked: now,
                stats,
            });
        }

        let online = statuses.iter().filter(|s| s.is_online).count();
        tracing::debug!(
            "Poll complete: {}/{} online, {} write failures",
            online,
            statuses.len(),
            write_failures
        );

        if persist {
            if let Some(retention) = &self.retention {
                retention.run_if_due(self.cleanup_every_days).await;
            }
        }

        Ok(statuses)
    }

    async fn stats_for(&self, id: &str, now: DateTime<Utc>) -> UptimeStats {
        match self.store.find_history(id).await {
            Ok(Some(history)) => compute_stats(&history.points, now),
            Ok(None) => compute_stats(&[], now),
            Err(e) => {
                tracing::warn!("Failed to load history for '{}': {}", id, e);
                UptimeStats::empty()
            }
        }
    }
}
