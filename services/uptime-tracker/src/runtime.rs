//! Container runtime snapshot source (Docker Engine API)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::error::{Result, UptimeError};
use crate::io::{ReqwestTransport, RuntimeTransport};

/// Reported state of one container in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    /// Normalized name (leading `/` stripped)
    pub id: String,
    pub running: bool,
    pub status_text: String,
}

/// Source of point-in-time runtime snapshots
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotSource: Send + Sync {
    /// Enumerate every container the runtime currently reports
    async fn list_containers(&self) -> Result<Vec<ContainerState>>;
}

/// Sorted, normalized names of all containers in the current snapshot
pub async fn container_names(source: &dyn SnapshotSource) -> Result<Vec<String>> {
    let mut names: Vec<String> = source
        .list_containers()
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();
    names.sort();
    Ok(names)
}

/// Strip the leading separator the runtime puts on container names
pub fn normalize_name(raw: &str) -> &str {
    raw.strip_prefix('/').unwrap_or(raw)
}

/// Docker Engine API `/containers/json` entry
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DockerContainer {
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: String,
}

const CONTAINERS_PATH: &str = "/containers/json";

/// Snapshot source backed by the Docker Engine API
pub struct DockerSnapshotSource {
    transport: Arc<dyn RuntimeTransport>,
    timeout: Duration,
}

impl std::fmt::Debug for DockerSnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerSnapshotSource")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DockerSnapshotSource {
    pub fn new(transport: Arc<dyn RuntimeTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Build the source from configuration: TCP when `url` is set, otherwise
    /// the local unix socket
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let transport: Arc<dyn RuntimeTransport> = match &config.url {
            Some(url) => {
                tracing::debug!("Using runtime API at {}", url);
                Arc::new(ReqwestTransport::new(url, config.timeout)?)
            }
            None => unix_transport(config)?,
        };
        Ok(Self::new(transport, config.timeout))
    }
}

#[cfg(unix)]
fn unix_transport(config: &RuntimeConfig) -> Result<Arc<dyn RuntimeTransport>> {
    tracing::debug!("Using runtime socket {:?}", config.socket_path);
    Ok(Arc::new(ReqwestTransport::unix_socket(
        &config.socket_path,
        config.timeout,
    )?))
}

#[cfg(not(unix))]
fn unix_transport(_config: &RuntimeConfig) -> Result<Arc<dyn RuntimeTransport>> {
    Err(UptimeError::Config(
        "runtime.url is required on platforms without unix sockets".to_string(),
    ))
}

#[async_trait]
impl SnapshotSource for DockerSnapshotSource {
    async fn list_containers(&self) -> Result<Vec<ContainerState>> {
        let response = tokio::time::timeout(self.timeout, self.transport.get(CONTAINERS_PATH))
            .await
            .map_err(|_| {
                UptimeError::SnapshotUnavailable(format!(
                    "no response within {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| UptimeError::SnapshotUnavailable(e.to_string()))?;

        if !response.is_success() {
            return Err(UptimeError::SnapshotUnavailable(format!(
                "runtime answered status {}",
                response.status
            )));
        }

        let containers: Vec<DockerContainer> = serde_json::from_str(&response.body)
            .map_err(|e| UptimeError::SnapshotUnavailable(format!("malformed snapshot: {}", e)))?;

        let snapshot: Vec<ContainerState> = containers
            .into_iter()
            .filter_map(|c| {
                let Some(name) = c.names.first() else {
                    tracing::debug!("Skipping container without a name");
                    return None;
                };
                Some(ContainerState {
                    id: normalize_name(name).to_string(),
                    running: c.state == "running",
                    status_text: c.status,
                })
            })
            .collect();

        tracing::debug!("Snapshot contains {} containers", snapshot.len());
        Ok(snapshot)
    }
}
