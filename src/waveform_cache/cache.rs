use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use super::store::{load_store, write_store, CacheEntries};
use crate::server::metrics;
use crate::waveform::{ComputedCurve, CurveOrigin, WaveformCurve};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Waveform computation for {key} did not complete: {source}")]
    ComputeAborted {
        key: String,
        #[source]
        source: JoinError,
    },
}

enum WriterCommand {
    Save,
    Flush(oneshot::Sender<()>),
}

type Slot = Arc<OnceCell<WaveformCurve>>;

/// Process-wide waveform memo, persisted to a JSON document.
///
/// Each key owns a slot that is filled at most once. Concurrent requests for
/// a missing key share a single computation, which runs on the blocking pool
/// inside its own task: it finishes and fills the slot even if every
/// requester has gone away.
///
/// Only analyzed curves reach disk. Writes go through a single writer task
/// that coalesces bursts of insertions into one atomic replace.
pub struct WaveformCache {
    path: PathBuf,
    slots: Mutex<HashMap<String, Slot>>,
    persisted: Arc<Mutex<CacheEntries>>,
    writer: mpsc::UnboundedSender<WriterCommand>,
}

impl WaveformCache {
    /// Loads the document at `path` and starts the writer task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(path: impl Into<PathBuf>, points: usize) -> Arc<Self> {
        let path = path.into();
        let loaded = load_store(&path, points);
        info!("Loaded {} cached waveforms from {:?}", loaded.len(), path);
        metrics::set_cache_entries(loaded.len());

        let slots = loaded
            .iter()
            .map(|(key, curve)| (key.clone(), Arc::new(OnceCell::new_with(Some(curve.clone())))))
            .collect();
        let persisted = Arc::new(Mutex::new(loaded));

        let (writer, commands) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(path.clone(), persisted.clone(), commands));

        Arc::new(Self {
            path,
            slots: Mutex::new(slots),
            persisted,
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Curve for `key` if it was already computed.
    pub fn get(&self, key: &str) -> Option<WaveformCurve> {
        let slots = self.slots.lock().unwrap();
        slots.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Number of computed curves held in memory.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap();
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of curves that are (or will be) on disk.
    pub fn persisted_len(&self) -> usize {
        self.persisted.lock().unwrap().len()
    }

    /// Returns the memoized curve, computing it with `compute` on a miss.
    ///
    /// `compute` runs at most once per key, no matter how many callers race.
    pub async fn get_or_compute<F>(&self, key: &str, compute: F) -> Result<WaveformCurve, CacheError>
    where
        F: FnOnce() -> ComputedCurve + Send + 'static,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap();
            slots.entry(key.to_string()).or_default().clone()
        };

        if let Some(curve) = slot.get() {
            metrics::record_cache_lookup(true);
            return Ok(curve.clone());
        }
        metrics::record_cache_lookup(false);

        let task_key = key.to_string();
        let persisted = self.persisted.clone();
        let writer = self.writer.clone();
        let task = tokio::spawn(async move {
            let curve = slot
                .get_or_try_init(move || async move {
                    let started = Instant::now();
                    let computed = tokio::task::spawn_blocking(compute).await?;
                    metrics::record_waveform_compute(started.elapsed());
                    debug!(
                        "Computed waveform for {} in {:?} ({:?})",
                        task_key,
                        started.elapsed(),
                        computed.origin
                    );

                    if computed.origin == CurveOrigin::Analyzed {
                        let count = {
                            let mut entries = persisted.lock().unwrap();
                            entries.insert(task_key, computed.curve.clone());
                            entries.len()
                        };
                        metrics::set_cache_entries(count);
                        if writer.send(WriterCommand::Save).is_err() {
                            warn!("Waveform cache writer is gone, curve kept in memory only");
                        }
                    }
                    Ok::<_, JoinError>(computed.curve)
                })
                .await?;
            Ok::<_, JoinError>(curve.clone())
        });

        match task.await {
            Ok(Ok(curve)) => Ok(curve),
            Ok(Err(source)) | Err(source) => Err(CacheError::ComputeAborted {
                key: key.to_string(),
                source,
            }),
        }
    }

    /// Waits until every insertion made so far has been written out.
    pub async fn flush(&self) {
        let (done, waiter) = oneshot::channel();
        if self.writer.send(WriterCommand::Flush(done)).is_err() {
            warn!("Waveform cache writer is gone, nothing to flush");
            return;
        }
        let _ = waiter.await;
    }

    pub async fn shutdown(&self) {
        self.flush().await;
        info!(
            "Waveform cache flushed, {} curves persisted to {:?}",
            self.persisted_len(),
            self.path
        );
    }
}

async fn run_writer(
    path: PathBuf,
    persisted: Arc<Mutex<CacheEntries>>,
    mut commands: mpsc::UnboundedReceiver<WriterCommand>,
) {
    while let Some(command) = commands.recv().await {
        let mut dirty = false;
        let mut waiters = Vec::new();
        let mut absorb = |command: WriterCommand| match command {
            WriterCommand::Save => dirty = true,
            WriterCommand::Flush(done) => waiters.push(done),
        };
        absorb(command);
        while let Ok(next) = commands.try_recv() {
            absorb(next);
        }

        if dirty {
            save_snapshot(&path, &persisted).await;
        }
        for done in waiters {
            let _ = done.send(());
        }
    }
    debug!("Waveform cache writer stopped");
}

async fn save_snapshot(path: &Path, persisted: &Arc<Mutex<CacheEntries>>) {
    let snapshot = persisted.lock().unwrap().clone();
    let target = path.to_path_buf();
    let count = snapshot.len();

    match tokio::task::spawn_blocking(move || write_store(&target, &snapshot)).await {
        Ok(Ok(())) => debug!("Persisted {} waveforms to {:?}", count, path),
        Ok(Err(err)) => {
            error!("Failed to persist waveform cache to {:?}: {}", path, err);
            metrics::record_cache_persist_error();
        }
        Err(err) => {
            error!("Waveform cache write task failed: {}", err);
            metrics::record_cache_persist_error();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform_cache::store::read_store;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn analyzed(value: f64) -> ComputedCurve {
        ComputedCurve::analyzed(vec![value; 4])
    }

    #[tokio::test]
    async fn test_compute_runs_once_per_key() {
        let dir = TempDir::new().unwrap();
        let cache = WaveformCache::open(dir.path().join("cache.json"), 4);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let curve = cache
                .get_or_compute("k", move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    analyzed(0.3)
                })
                .await
                .unwrap();
            assert_eq!(curve, vec![0.3; 4]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("k"), Some(vec![0.3; 4]));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_computation() {
        let dir = TempDir::new().unwrap();
        let cache = WaveformCache::open(dir.path().join("cache.json"), 4);
        let calls = Arc::new(AtomicUsize::new(0));

        let lookups = (0..8).map(|_| {
            let calls = calls.clone();
            let cache = cache.clone();
            async move {
                cache
                    .get_or_compute("shared", move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(50));
                        analyzed(0.7)
                    })
                    .await
                    .unwrap()
            }
        });
        let results = futures::future::join_all(lookups).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|curve| *curve == vec![0.7; 4]));
    }

    #[tokio::test]
    async fn test_analyzed_curves_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let cache = WaveformCache::open(&path, 4);
        cache.get_or_compute("/audio/a.wav", || analyzed(0.4)).await.unwrap();
        cache.flush().await;

        let reopened = WaveformCache::open(&path, 4);
        assert_eq!(reopened.get("/audio/a.wav"), Some(vec![0.4; 4]));

        let curve = reopened
            .get_or_compute("/audio/a.wav", || panic!("must not recompute"))
            .await
            .unwrap();
        assert_eq!(curve, vec![0.4; 4]);
    }

    #[tokio::test]
    async fn test_synthetic_curves_stay_in_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let cache = WaveformCache::open(&path, 4);

        cache.get_or_compute("analyzed", || analyzed(0.2)).await.unwrap();
        cache
            .get_or_compute("synthetic", || ComputedCurve::synthetic(vec![0.5; 4]))
            .await
            .unwrap();
        cache.flush().await;

        assert_eq!(cache.len(), 2);
        let on_disk = read_store(&path).unwrap();
        assert!(on_disk.contains_key("analyzed"));
        assert!(!on_disk.contains_key("synthetic"));
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_serving_from_memory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();

        let cache = WaveformCache::open(blocker.join("cache.json"), 4);
        let curve = cache.get_or_compute("k", || analyzed(0.6)).await.unwrap();
        cache.flush().await;

        assert_eq!(curve, vec![0.6; 4]);
        assert_eq!(cache.get("k"), Some(vec![0.6; 4]));
    }

    #[tokio::test]
    async fn test_panicking_compute_is_reported() {
        let dir = TempDir::new().unwrap();
        let cache = WaveformCache::open(dir.path().join("cache.json"), 4);

        let result = cache.get_or_compute("bad", || panic!("boom")).await;
        assert!(matches!(result, Err(CacheError::ComputeAborted { .. })));

        // The slot stays empty and a later computation may fill it.
        let curve = cache.get_or_compute("bad", || analyzed(0.1)).await.unwrap();
        assert_eq!(curve, vec![0.1; 4]);
    }

    #[tokio::test]
    async fn test_computation_completes_after_requester_drops() {
        let dir = TempDir::new().unwrap();
        let cache = WaveformCache::open(dir.path().join("cache.json"), 4);

        let lookup = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute("slow", || {
                        std::thread::sleep(Duration::from_millis(100));
                        analyzed(0.8)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        lookup.abort();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(cache.get("slow"), Some(vec![0.8; 4]));
    }
}
