//! Screening result cache.
//!
//! Results are keyed by [`CacheKey`] (canonical filter hash plus trading
//! date) and accessed only through [`ScreeningCache::get_or_compute`]:
//!
//! - a ready entry is returned marked `served_from_cache`
//! - concurrent requests for a key that is being computed await the same
//!   shared future, so one scan runs per key
//! - a scan runs in its own task; dropping the caller does not stop it
//! - `cancel`/`cancel_all` abort in-flight scans, and their waiters receive
//!   `ScanCancelled`
//! - failures are never stored
//! - the first request for a new trading date drops every older entry;
//!   scans still running for the old date keep serving their waiters, stay
//!   reachable from `cancel_all` and never write a snapshot
//!
//! With a snapshot directory configured, results are also written as JSON per
//! (date, key) and read back on a miss. A snapshot that fails to parse is a
//! miss and is overwritten by the fresh result.

use chrono::NaiveDate;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, ScreenerError};

use super::engine::ScreenResult;
use super::filter::CacheKey;

/// A finished scan as stored in the cache.
#[derive(Debug, Clone)]
struct CachedScan {
    result: Arc<ScreenResult>,
    from_snapshot: bool,
}

type ScanFuture = Shared<BoxFuture<'static, Result<CachedScan>>>;

enum Slot {
    Ready(Arc<ScreenResult>),
    InFlight {
        future: ScanFuture,
        abort: AbortHandle,
        generation: u64,
    },
}

#[derive(Default)]
struct State {
    trading_date: Option<NaiveDate>,
    slots: HashMap<CacheKey, Slot>,
    /// Scans for a previous trading date, by generation.
    orphaned: HashMap<u64, AbortHandle>,
    next_generation: u64,
}

impl State {
    fn is_current(&self, key: &CacheKey) -> bool {
        self.trading_date == Some(key.trading_date)
    }
}

struct Inner {
    state: Mutex<State>,
    snapshots: Option<SnapshotStore>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ScreenerError::Internal("screening cache lock poisoned".into()))
    }

    /// Whether `key` still belongs to the cached trading date.
    fn is_current(&self, key: &CacheKey) -> bool {
        self.lock().map(|state| state.is_current(key)).unwrap_or(false)
    }

    /// Record the outcome of the scan with `generation`, unless it was
    /// cancelled or invalidated meanwhile.
    fn finish(&self, key: &CacheKey, generation: u64, outcome: &Result<CachedScan>) {
        let Ok(mut state) = self.lock() else {
            warn!(key = %key, "Screening cache lock poisoned, result not stored");
            return;
        };
        if state.orphaned.remove(&generation).is_some() {
            debug!(key = %key, "Scan for a previous trading date finished, result discarded");
            return;
        }
        let current = matches!(
            state.slots.get(key),
            Some(Slot::InFlight { generation: g, .. }) if *g == generation
        );
        if !current {
            debug!(key = %key, "Scan finished after invalidation, result discarded");
            return;
        }
        match outcome {
            Ok(scan) => {
                state.slots.insert(key.clone(), Slot::Ready(Arc::clone(&scan.result)));
            }
            Err(_) => {
                state.slots.remove(key);
            }
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub trading_date: Option<NaiveDate>,
    pub entries: usize,
    pub in_flight: usize,
    pub orphaned: usize,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub snapshot_dir: Option<PathBuf>,
}

/// Single-flight screening cache.
#[derive(Clone)]
pub struct ScreeningCache {
    inner: Arc<Inner>,
}

impl Default for ScreeningCache {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ScreeningCache {
    pub fn new(snapshot_dir: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                snapshots: snapshot_dir.map(SnapshotStore::new),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
            }),
        }
    }

    /// Return the cached result for `key`, or run `compute` once for all
    /// concurrent callers.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Result<ScreenResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ScreenResult>> + Send + 'static,
    {
        let future = {
            let mut state = self.inner.lock()?;
            self.roll_over(&mut state, key.trading_date);

            match state.slots.get(&key) {
                Some(Slot::Ready(result)) => {
                    self.inner.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Screening cache hit");
                    return Ok(served(result, true));
                }
                Some(Slot::InFlight { future, .. }) => {
                    self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Joining in-flight scan");
                    future.clone()
                }
                None => {
                    self.inner.misses.fetch_add(1, Ordering::Relaxed);
                    let generation = state.next_generation;
                    state.next_generation += 1;
                    let future = self.spawn_scan(key.clone(), generation, compute());
                    state.slots.insert(
                        key,
                        Slot::InFlight {
                            future: future.0.clone(),
                            abort: future.1,
                            generation,
                        },
                    );
                    future.0
                }
            }
        };

        let scan = future.await?;
        Ok(served(&scan.result, scan.from_snapshot))
    }

    fn spawn_scan<Fut>(&self, key: CacheKey, generation: u64, compute: Fut) -> (ScanFuture, AbortHandle)
    where
        Fut: Future<Output = Result<ScreenResult>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let outcome = match inner.snapshots.as_ref() {
                Some(store) => match store.load(&key).await {
                    Some(result) => Ok(CachedScan {
                        result: Arc::new(result),
                        from_snapshot: true,
                    }),
                    None => compute_and_save(compute, Some(store), &inner, &key).await,
                },
                None => compute_and_save(compute, None, &inner, &key).await,
            };
            inner.finish(&key, generation, &outcome);
            outcome
        });
        let abort = handle.abort_handle();

        let future: BoxFuture<'static, Result<CachedScan>> = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => Err(ScreenerError::ScanCancelled),
                Err(e) => Err(ScreenerError::Internal(format!("scan task failed: {}", e))),
            }
        }
        .boxed();
        (future.shared(), abort)
    }

    /// Drop every entry when the trading date changes. In-flight scans move
    /// to the orphaned set so they can still be cancelled.
    fn roll_over(&self, state: &mut State, trading_date: NaiveDate) {
        if state.trading_date == Some(trading_date) {
            return;
        }
        if let Some(previous) = state.trading_date {
            info!(
                %previous,
                current = %trading_date,
                dropped = state.slots.len(),
                "Trading date changed, invalidating screening cache"
            );
        }
        let slots = std::mem::take(&mut state.slots);
        for slot in slots.into_values() {
            if let Slot::InFlight { abort, generation, .. } = slot {
                state.orphaned.insert(generation, abort);
            }
        }
        state.trading_date = Some(trading_date);

        if let Some(store) = self.inner.snapshots.clone() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move { store.prune_except(trading_date).await });
            }
        }
    }

    /// Abort the in-flight scan for `key`. Returns whether one was running.
    pub fn cancel(&self, key: &CacheKey) -> Result<bool> {
        let mut state = self.inner.lock()?;
        if !matches!(state.slots.get(key), Some(Slot::InFlight { .. })) {
            return Ok(false);
        }
        if let Some(Slot::InFlight { abort, .. }) = state.slots.remove(key) {
            abort.abort();
            info!(key = %key, "Scan cancelled");
        }
        Ok(true)
    }

    /// Abort every in-flight scan, including those left over from a previous
    /// trading date. Returns how many were cancelled.
    pub fn cancel_all(&self) -> Result<usize> {
        let mut state = self.inner.lock()?;
        let orphaned: Vec<AbortHandle> = state.orphaned.drain().map(|(_, abort)| abort).collect();
        for abort in &orphaned {
            abort.abort();
        }
        let in_flight: Vec<CacheKey> = state
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::InFlight { .. }))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &in_flight {
            if let Some(Slot::InFlight { abort, .. }) = state.slots.remove(key) {
                abort.abort();
            }
        }
        let cancelled = in_flight.len() + orphaned.len();
        if cancelled > 0 {
            info!(cancelled, orphaned = orphaned.len(), "Cancelled in-flight scans");
        }
        Ok(cancelled)
    }

    pub fn stats(&self) -> CacheStats {
        let (trading_date, entries, in_flight, orphaned) = match self.inner.lock() {
            Ok(state) => {
                let in_flight = state
                    .slots
                    .values()
                    .filter(|s| matches!(s, Slot::InFlight { .. }))
                    .count();
                (
                    state.trading_date,
                    state.slots.len() - in_flight,
                    in_flight,
                    state.orphaned.len(),
                )
            }
            Err(_) => (None, 0, 0, 0),
        };
        CacheStats {
            trading_date,
            entries,
            in_flight,
            orphaned,
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            snapshot_dir: self.inner.snapshots.as_ref().map(|s| s.dir.clone()),
        }
    }
}

fn served(result: &ScreenResult, from_cache: bool) -> ScreenResult {
    let mut result = result.clone();
    result.served_from_cache = from_cache;
    result
}

async fn compute_and_save<Fut>(
    compute: Fut,
    store: Option<&SnapshotStore>,
    inner: &Inner,
    key: &CacheKey,
) -> Result<CachedScan>
where
    Fut: Future<Output = Result<ScreenResult>>,
{
    let result = compute.await?;
    if let Some(store) = store {
        // Snapshots of a date that already rolled over would outlive the prune
        if inner.is_current(key) {
            store.save(key, &result).await;
        } else {
            debug!(key = %key, "Trading date rolled over, snapshot not written");
        }
    }
    Ok(CachedScan {
        result: Arc::new(result),
        from_snapshot: false,
    })
}

// ============================================================================
// Snapshot Store
// ============================================================================

/// On-disk JSON snapshots, one directory per trading date.
#[derive(Debug, Clone)]
struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, key: &CacheKey) -> PathBuf {
        self.dir
            .join(key.trading_date.to_string())
            .join(format!("{}.json", key.filter_hash))
    }

    async fn load(&self, key: &CacheKey) -> Option<ScreenResult> {
        let path = self.path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read scan snapshot");
                return None;
            }
        };
        match serde_json::from_slice::<ScreenResult>(&bytes) {
            Ok(result) => {
                debug!(key = %key, "Loaded scan snapshot");
                Some(result)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt scan snapshot, recomputing");
                None
            }
        }
    }

    async fn save(&self, key: &CacheKey, result: &ScreenResult) {
        let path = self.path(key);
        if let Err(e) = write_atomic(&path, result).await {
            warn!(path = %path.display(), error = %e, "Failed to write scan snapshot");
        }
    }

    /// Remove snapshot directories of every other trading date.
    async fn prune_except(&self, keep: NaiveDate) {
        let keep = keep.to_string();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(_) => return,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy() == keep {
                continue;
            }
            if let Err(e) = tokio::fs::remove_dir_all(entry.path()).await {
                warn!(path = %entry.path().display(), error = %e, "Failed to prune scan snapshots");
            }
        }
    }
}

async fn write_atomic(path: &Path, result: &ScreenResult) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec(result).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await
}
