//! Allowlist of tracked workloads

use serde::{Deserialize, Serialize};

/// A workload whose liveness is tracked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedWorkload {
    /// Runtime-reported name with the leading separator stripped
    pub id: String,
    pub display_name: String,
}

impl TrackedWorkload {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Fixed, ordered set of tracked workloads.
///
/// The order of the registry is the order of every status list produced from
/// it; workloads reported by the runtime but missing here are never surfaced.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    workloads: Vec<TrackedWorkload>,
}

impl Registry {
    /// Build a registry, dropping later duplicates of an id
    pub fn new(workloads: Vec<TrackedWorkload>) -> Self {
        let mut unique: Vec<TrackedWorkload> = Vec::with_capacity(workloads.len());
        for workload in workloads {
            if unique.iter().any(|w| w.id == workload.id) {
                tracing::warn!("Duplicate workload id '{}' ignored", workload.id);
                continue;
            }
            unique.push(workload);
        }
        Self { workloads: unique }
    }

    pub fn list(&self) -> &[TrackedWorkload] {
        &self.workloads
    }

    pub fn len(&self) -> usize {
        self.workloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
    }
}
