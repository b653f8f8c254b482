//! TTL cache with single-flight refresh and background auto-refresh
//!
//! At most one refresh runs per key at any time: foreground `get` calls that
//! find the entry expired queue on the key's refresh lock, and whoever gets
//! it second sees the value the first one stored. Background intervals take
//! the same lock, so a cache miss racing a timer tick polls only once.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A cached value and when it was stored
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub last_updated: Instant,
}

struct Slot<V> {
    entry: RwLock<Option<CacheEntry<V>>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl<V: Clone> Slot<V> {
    fn new() -> Self {
        Self {
            entry: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn fresh(&self, ttl: Duration) -> Option<V> {
        self.entry
            .read()
            .await
            .as_ref()
            .filter(|e| e.last_updated.elapsed() < ttl)
            .map(|e| e.value.clone())
    }

    async fn current(&self) -> Option<V> {
        self.entry.read().await.as_ref().map(|e| e.value.clone())
    }

    async fn store(&self, value: V) {
        *self.entry.write().await = Some(CacheEntry {
            value,
            last_updated: Instant::now(),
        });
    }
}

/// Keyed cache whose entries expire after a caller-supplied TTL
pub struct TtlCache<V> {
    slots: Mutex<HashMap<String, Arc<Slot<V>>>>,
    intervals: Mutex<HashMap<String, CancellationToken>>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            intervals: Mutex::new(HashMap::new()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<Slot<V>> {
        Arc::clone(
            lock(&self.slots)
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    /// Return the cached value if it is younger than `ttl`, otherwise run
    /// `refresh`, store its result and return it.
    ///
    /// If `refresh` fails while an older value is cached, the older value is
    /// served. With nothing cached the error is returned.
    pub async fn get<F, Fut>(&self, key: &str, refresh: F, ttl: Duration) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let slot = self.slot(key);
        if let Some(value) = slot.fresh(ttl).await {
            return Ok(value);
        }

        let _guard = slot.refresh_lock.lock().await;
        // Someone else may have refreshed while we waited
        if let Some(value) = slot.fresh(ttl).await {
            tracing::debug!("Cache '{}' refreshed by a concurrent caller", key);
            return Ok(value);
        }

        tracing::debug!("Cache '{}' expired, refreshing", key);
        match refresh().await {
            Ok(value) => {
                slot.store(value.clone()).await;
                Ok(value)
            }
            Err(e) => match slot.current().await {
                Some(stale) => {
                    tracing::warn!(
                        "Refreshing cache '{}' failed, serving stale value: {}",
                        key,
                        e
                    );
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Current entry regardless of age
    pub async fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        let slot = lock(&self.slots).get(key).cloned()?;
        let entry = slot.entry.read().await.clone();
        entry
    }

    /// Run `refresh` every `interval` in the background, storing each
    /// successful result under `key`. Replaces any interval already running
    /// for the key. Failures are logged and leave the cached value in place.
    pub fn start_interval<F, Fut>(&self, key: &str, refresh: F, interval: Duration)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let slot = self.slot(key);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_key = key.to_string();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => {
                        tracing::debug!("Refresh interval for '{}' stopped", task_key);
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                // Not raced against cancellation: an in-flight refresh always lands
                let _guard = slot.refresh_lock.lock().await;
                match refresh().await {
                    Ok(value) => {
                        slot.store(value).await;
                        tracing::debug!("Cache '{}' refreshed in background", task_key);
                    }
                    Err(e) => {
                        tracing::warn!("Error updating cache for '{}': {}", task_key, e);
                    }
                }
            }
        });

        let previous = lock(&self.intervals).insert(key.to_string(), cancel);
        if let Some(previous) = previous {
            tracing::debug!("Replacing refresh interval for '{}'", key);
            previous.cancel();
        }
        tracing::info!("Refreshing '{}' every {:?}", key, interval);
    }

    /// Stop the background interval for `key`, keeping the cached value.
    /// Returns whether an interval was running.
    pub fn stop_interval(&self, key: &str) -> bool {
        match lock(&self.intervals).remove(key) {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn has_interval(&self, key: &str) -> bool {
        lock(&self.intervals).contains_key(key)
    }
}

impl<V> Drop for TtlCache<V> {
    fn drop(&mut self) {
        for (_, cancel) in lock(&self.intervals).drain() {
            cancel.cancel();
        }
    }
}
