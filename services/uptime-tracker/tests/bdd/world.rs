//! BDD test world for the uptime tracker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cucumber::World;
use uptime_tracker::api::AppState;
use uptime_tracker::pipeline::ServiceStatus;
use uptime_tracker::registry::{Registry, TrackedWorkload};
use uptime_tracker::retention::CleanupReport;
use uptime_tracker::runtime::{ContainerState, SnapshotSource};
use uptime_tracker::store::MemoryStore;
use uptime_tracker::{Config, UptimeError};

/// Container runtime double whose snapshot can be changed or broken mid-scenario
#[derive(Debug, Default)]
pub struct FakeRuntime {
    containers: Mutex<Vec<ContainerState>>,
    unavailable: AtomicBool,
}

impl FakeRuntime {
    pub fn set_running(&self, id: &str) {
        let mut containers = self.containers.lock().unwrap();
        containers.retain(|c| c.id != id);
        containers.push(ContainerState {
            id: id.to_string(),
            running: true,
            status_text: "Up 5 minutes".to_string(),
        });
    }

    pub fn set_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotSource for FakeRuntime {
    async fn list_containers(&self) -> uptime_tracker::Result<Vec<ContainerState>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(UptimeError::SnapshotUnavailable(
                "connect ENOENT /var/run/docker.sock".to_string(),
            ));
        }
        Ok(self.containers.lock().unwrap().clone())
    }
}

#[derive(Default, World)]
pub struct UptimeWorld {
    pub config: Config,
    pub workloads: Vec<TrackedWorkload>,
    pub runtime: Arc<FakeRuntime>,
    pub store: Arc<MemoryStore>,
    pub state: Option<AppState>,

    pub statuses: Option<uptime_tracker::Result<Vec<ServiceStatus>>>,
    pub cleanup: Option<uptime_tracker::Result<CleanupReport>>,

    pub response_status: Option<u16>,
    pub response_body: Option<serde_json::Value>,
}

impl std::fmt::Debug for UptimeWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UptimeWorld")
            .field("workloads", &self.workloads)
            .field("runtime", &self.runtime)
            .field("statuses", &self.statuses)
            .field("response_status", &self.response_status)
            .finish()
    }
}

impl UptimeWorld {
    /// Service state over the fake runtime and memory store, built on first use
    pub fn state(&mut self) -> AppState {
        if self.state.is_none() {
            let registry = Arc::new(Registry::new(self.workloads.clone()));
            let source: Arc<dyn SnapshotSource> = self.runtime.clone();
            self.state = Some(uptime_tracker::build_state_with(
                &self.config,
                registry,
                source,
                self.store.clone(),
            ));
        }
        self.state.clone().expect("state was just built")
    }

    pub fn statuses(&self) -> &[ServiceStatus] {
        match self.statuses.as_ref().expect("no poll was made") {
            Ok(statuses) => statuses,
            Err(e) => panic!("poll failed: {}", e),
        }
    }

    pub fn status_of(&self, id: &str) -> &ServiceStatus {
        self.statuses()
            .iter()
            .find(|s| s.id == id)
            .unwrap_or_else(|| panic!("no status for '{}'", id))
    }
}
