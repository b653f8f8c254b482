//! Point history persistence
//!
//! The [`Store`] trait is the narrow interface the pipeline and retention
//! manager use. Two implementations are provided: an in-memory map and a
//! JSON-lines log loaded once at startup, appended to per point and compacted
//! atomically when pruned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};

use crate::error::{Result, UptimeError};

/// One timestamped online/offline sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationPoint {
    pub timestamp: DateTime<Utc>,
    pub is_online: bool,
}

/// Append-ordered points of a single workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadHistory {
    pub id: String,
    pub points: Vec<ObservationPoint>,
}

impl WorkloadHistory {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            points: Vec::new(),
        }
    }

    /// Number of points strictly older than `cutoff`
    pub fn count_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        self.points.iter().filter(|p| p.timestamp < cutoff).count()
    }

    /// Drop points strictly older than `cutoff`, returning how many went
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.points.len();
        self.points.retain(|p| p.timestamp >= cutoff);
        before - self.points.len()
    }
}

/// Persistence interface for workload histories
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait Store: Send + Sync {
    /// Whether the backing storage was reachable when the store was opened
    fn healthy(&self) -> bool;

    /// Append a point, creating the workload's history if it does not exist
    async fn append_point(&self, id: &str, point: ObservationPoint) -> Result<()>;

    /// History of one workload; `None` when nothing is stored for it
    async fn find_history(&self, id: &str) -> Result<Option<WorkloadHistory>>;

    /// Remove every point older than `cutoff` across all workloads
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Every stored history
    async fn list_all(&self) -> Result<Vec<WorkloadHistory>>;
}

type HistoryMap = BTreeMap<String, WorkloadHistory>;

fn append_to(histories: &mut HistoryMap, id: &str, point: ObservationPoint) {
    histories
        .entry(id.to_string())
        .or_insert_with(|| WorkloadHistory::new(id))
        .points
        .push(point);
}

/// Prune every history; histories left without points are removed
fn prune_map(histories: &mut HistoryMap, cutoff: DateTime<Utc>) -> u64 {
    let mut removed = 0u64;
    histories.retain(|_, history| {
        removed += history.prune_older_than(cutoff) as u64;
        !history.points.is_empty()
    });
    removed
}

/// Store keeping all histories in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    histories: RwLock<HistoryMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn healthy(&self) -> bool {
        true
    }

    async fn append_point(&self, id: &str, point: ObservationPoint) -> Result<()> {
        append_to(&mut *self.histories.write().await, id, point);
        Ok(())
    }

    async fn find_history(&self, id: &str) -> Result<Option<WorkloadHistory>> {
        Ok(self.histories.read().await.get(id).cloned())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(prune_map(&mut *self.histories.write().await, cutoff))
    }

    async fn list_all(&self) -> Result<Vec<WorkloadHistory>> {
        Ok(self.histories.read().await.values().cloned().collect())
    }
}

/// One line of the history log
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointRecord {
    id: String,
    timestamp: DateTime<Utc>,
    is_online: bool,
}

fn encode_line(id: &str, point: ObservationPoint) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(&PointRecord {
        id: id.to_string(),
        timestamp: point.timestamp,
        is_online: point.is_online,
    })?;
    line.push(b'\n');
    Ok(line)
}

/// Histories read back from a log, and where the last complete record ends
struct LoadedLog {
    histories: HistoryMap,
    valid_len: u64,
    needs_repair: bool,
}

/// Parse a history log. An unterminated, unparseable final line after at
/// least one good record is a torn write and is dropped; any other bad line
/// fails the whole load.
fn parse_log(content: &[u8]) -> Result<LoadedLog> {
    let mut histories = HistoryMap::new();
    let mut offset = 0usize;
    let mut parsed = 0usize;

    while offset < content.len() {
        let rest = &content[offset..];
        let (line, next, terminated) = match rest.iter().position(|&b| b == b'\n') {
            Some(end) => (&rest[..end], offset + end + 1, true),
            None => (rest, content.len(), false),
        };

        if !line.iter().all(u8::is_ascii_whitespace) {
            match serde_json::from_slice::<PointRecord>(line) {
                Ok(record) => {
                    let point = ObservationPoint {
                        timestamp: record.timestamp,
                        is_online: record.is_online,
                    };
                    append_to(&mut histories, &record.id, point);
                    parsed += 1;
                }
                Err(_) if !terminated && parsed > 0 => {
                    tracing::warn!(
                        "Dropping torn record at end of history log ({} bytes)",
                        line.len()
                    );
                    return Ok(LoadedLog {
                        histories,
                        valid_len: offset as u64,
                        needs_repair: true,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        offset = next;
    }

    Ok(LoadedLog {
        histories,
        valid_len: offset as u64,
        needs_repair: content.last().is_some_and(|&b| b != b'\n'),
    })
}

/// Store persisting histories as a JSON-lines log, one record per point.
///
/// Appends add a single line to the end of the file. Pruning compacts the
/// log into a fresh file that replaces the old one.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    histories: RwLock<HistoryMap>,
    /// Append handle, opened on first write. Held while writing so file order
    /// matches memory order.
    log: Mutex<Option<File>>,
    healthy: bool,
}

impl JsonFileStore {
    /// Open the store, loading any existing log.
    ///
    /// A missing file starts an empty store. A file that cannot be read or
    /// parsed leaves the store unhealthy; every operation then fails with
    /// [`UptimeError::PersistenceUnavailable`] and the file is never
    /// overwritten.
    pub async fn connect(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (histories, healthy) = match load_histories(&path).await {
            Ok(histories) => {
                tracing::info!(
                    "Opened history store {:?} ({} workloads)",
                    path,
                    histories.len()
                );
                (histories, true)
            }
            Err(e) => {
                tracing::error!("History store {:?} unavailable: {}", path, e);
                (HistoryMap::new(), false)
            }
        };

        Self {
            path,
            histories: RwLock::new(histories),
            log: Mutex::new(None),
            healthy,
        }
    }

    fn ensure_healthy(&self) -> Result<()> {
        if self.healthy() {
            Ok(())
        } else {
            Err(UptimeError::PersistenceUnavailable(format!(
                "history store {:?} failed to load",
                self.path
            )))
        }
    }

    /// Append one encoded record, cutting the file back if the write fails
    async fn write_line(&self, log: &mut Option<File>, line: &[u8]) -> Result<()> {
        if log.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *log = Some(file);
        }
        let file = log.as_mut().ok_or_else(|| {
            UptimeError::PersistenceUnavailable(format!("history log {:?} not open", self.path))
        })?;

        let len = file.metadata().await?.len();
        let written = match file.write_all(line).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(trunc) = file.set_len(len).await {
                tracing::warn!("Could not cut partial record from {:?}: {}", self.path, trunc);
            }
            *log = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Rewrite the log from `histories` via a sibling temp file and rename
    async fn compact(&self, histories: &HistoryMap) -> Result<()> {
        let mut content = Vec::new();
        for history in histories.values() {
            for point in &history.points {
                content.extend_from_slice(&encode_line(&history.id, *point)?);
            }
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

async fn load_histories(path: &Path) -> Result<HistoryMap> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("History store {:?} not found, starting empty", path);
            return Ok(HistoryMap::new());
        }
        Err(e) => return Err(e.into()),
    };

    let loaded = parse_log(&content)?;
    if loaded.needs_repair {
        // Leave the file ending on a record boundary before appending to it
        let mut file = OpenOptions::new().write(true).open(path).await?;
        file.set_len(loaded.valid_len).await?;
        if loaded.valid_len as usize == content.len() {
            file.seek(std::io::SeekFrom::End(0)).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;
    }
    Ok(loaded.histories)
}

#[async_trait]
impl Store for JsonFileStore {
    fn healthy(&self) -> bool {
        self.healthy
    }

    async fn append_point(&self, id: &str, point: ObservationPoint) -> Result<()> {
        self.ensure_healthy()?;
        let line = encode_line(id, point)?;

        let mut log = self.log.lock().await;
        self.write_line(&mut log, &line)
            .await
            .map_err(|e| UptimeError::WorkloadWrite {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        append_to(&mut *self.histories.write().await, id, point);
        Ok(())
    }

    async fn find_history(&self, id: &str) -> Result<Option<WorkloadHistory>> {
        self.ensure_healthy()?;
        Ok(self.histories.read().await.get(id).cloned())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.ensure_healthy()?;

        // Appends wait for the compaction; readers keep the old map meanwhile
        let mut log = self.log.lock().await;
        let mut pruned = self.histories.read().await.clone();
        let removed = prune_map(&mut pruned, cutoff);
        if removed == 0 {
            return Ok(0);
        }

        *log = None;
        self.compact(&pruned)
            .await
            .map_err(|e| UptimeError::Prune(e.to_string()))?;
        *self.histories.write().await = pruned;
        Ok(removed)
    }

    async fn list_all(&self) -> Result<Vec<WorkloadHistory>> {
        self.ensure_healthy()?;
        Ok(self.histories.read().await.values().cloned().collect())
    }
}
