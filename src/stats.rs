use crate::model::{Entry, Stats};
use crate::store::{now_millis, CatalogStore, StoreFingerprint, WriteObserver};
use anyhow::Result;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum StatsState {
    Empty,
    Computing,
    Ready {
        stats: Stats,
        fingerprint: Option<StoreFingerprint>,
    },
}

/// Aggregate figures over the catalog, recomputed lazily.
///
/// Creates reach the cache through [`WriteObserver`]; edits made behind the
/// store's back are caught on read by comparing file fingerprints. A failed
/// recompute leaves the cache empty so the next read tries again.
#[derive(Debug)]
pub struct StatsCache {
    state: StatsState,
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCache {
    pub fn new() -> Self {
        Self {
            state: StatsState::Empty,
        }
    }

    pub fn state(&self) -> &StatsState {
        &self.state
    }

    pub fn invalidate(&mut self) {
        if !matches!(self.state, StatsState::Empty) {
            debug!("stats cache invalidated");
        }
        self.state = StatsState::Empty;
    }

    /// Cached figures if they still describe the file; otherwise moves to
    /// `Computing` and returns `None`, and the caller must follow up with
    /// [`Self::finish`].
    pub fn begin(&mut self, store: &CatalogStore) -> Option<Stats> {
        if let StatsState::Ready { stats, fingerprint } = &self.state {
            let current = store.fingerprint().ok();
            if current.is_some() && current == *fingerprint {
                return Some(stats.clone());
            }
            debug!(path = %store.path().display(), "data file changed since stats were computed");
            self.invalidate();
        }
        self.state = StatsState::Computing;
        None
    }

    /// Stores a recompute result. An invalidation that arrived while
    /// computing wins: the figures go back to the caller but are not cached.
    pub fn finish(
        &mut self,
        result: Result<(Stats, Option<StoreFingerprint>)>,
    ) -> Result<Stats> {
        let still_current = matches!(self.state, StatsState::Computing);
        match result {
            Ok((stats, fingerprint)) if still_current => {
                info!(total = stats.total, "stats cache recalculated");
                self.state = StatsState::Ready {
                    stats: stats.clone(),
                    fingerprint,
                };
                Ok(stats)
            }
            Ok((stats, _)) => {
                debug!("stats invalidated during recompute, not caching");
                Ok(stats)
            }
            Err(err) => {
                if still_current {
                    self.state = StatsState::Empty;
                }
                Err(err)
            }
        }
    }

    pub fn get(&mut self, store: &CatalogStore) -> Result<Stats> {
        match self.begin(store) {
            Some(stats) => Ok(stats),
            None => self.finish(recompute(store)),
        }
    }
}

fn recompute(store: &CatalogStore) -> Result<(Stats, Option<StoreFingerprint>)> {
    // Fingerprint first: a write landing between the two calls makes the
    // next read recompute instead of trusting stale figures.
    let fingerprint = store.fingerprint().ok();
    let entries = store.read_all()?;
    Ok((compute_stats(&entries, now_millis()), fingerprint))
}

pub fn compute_stats(entries: &[Entry], timestamp: u64) -> Stats {
    let total = entries.len();
    let average_price = if total > 0 {
        entries.iter().map(|e| e.price).sum::<f64>() / total as f64
    } else {
        0.0
    };
    Stats {
        total,
        average_price,
        timestamp,
    }
}

#[derive(Debug, Default)]
pub struct SharedStats {
    inner: Mutex<StatsCache>,
}

impl SharedStats {
    pub fn lock(&self) -> MutexGuard<'_, StatsCache> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The file is read without holding the lock, so writes landing
    /// meanwhile invalidate a `Computing` cache instead of waiting.
    pub fn get(&self, store: &CatalogStore) -> Result<Stats> {
        if let Some(stats) = self.lock().begin(store) {
            return Ok(stats);
        }
        let result = recompute(store);
        self.lock().finish(result)
    }
}

impl WriteObserver for SharedStats {
    fn entries_changed(&self) {
        self.lock().invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewEntry;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn test_root(name: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir().join(format!("catalog-rs-stats-{name}-{nonce}"))
    }

    fn seeded_store(root: &Path) -> PathBuf {
        fs::create_dir_all(root).expect("create dir");
        let path = root.join("items.json");
        fs::write(
            &path,
            r#"[{"id":1,"name":"a","price":10},{"id":2,"name":"b","price":20}]"#,
        )
        .expect("seed");
        path
    }

    #[test]
    fn compute_stats_handles_empty_catalog() {
        let stats = compute_stats(&[], 7);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_price, 0.0);
        assert_eq!(stats.timestamp, 7);
    }

    #[test]
    fn read_while_empty_computes_and_becomes_ready() {
        let root = test_root("ready");
        let store = CatalogStore::open(seeded_store(&root));
        let mut cache = StatsCache::new();
        assert_eq!(cache.state(), &StatsState::Empty);

        let stats = cache.get(&store).expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.average_price, 15.0);
        assert!(matches!(cache.state(), StatsState::Ready { .. }));

        let again = cache.get(&store).expect("cached stats");
        assert_eq!(again.timestamp, stats.timestamp);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn failed_recompute_leaves_cache_empty() {
        let root = test_root("fail");
        let store = CatalogStore::open(root.join("missing.json"));
        let mut cache = StatsCache::new();

        assert!(cache.get(&store).is_err());
        assert_eq!(cache.state(), &StatsState::Empty);
    }

    #[test]
    fn append_through_store_invalidates_shared_cache() {
        let root = test_root("observer");
        let path = seeded_store(&root);
        let shared = Arc::new(SharedStats::default());
        let store = CatalogStore::open(&path).with_observer(shared.clone());

        assert_eq!(shared.get(&store).expect("stats").total, 2);
        store
            .append(NewEntry {
                name: "c".to_string(),
                price: 30.0,
                category: None,
            })
            .expect("append");
        assert_eq!(shared.lock().state(), &StatsState::Empty);

        let stats = shared.get(&store).expect("stats");
        assert_eq!(stats.total, 3);
        assert_eq!(stats.average_price, 20.0);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn invalidation_during_recompute_is_not_overwritten() {
        let root = test_root("computing");
        let store = CatalogStore::open(seeded_store(&root));
        let mut cache = StatsCache::new();

        assert!(cache.begin(&store).is_none());
        assert_eq!(cache.state(), &StatsState::Computing);
        let result = recompute(&store);
        cache.invalidate();

        let stats = cache.finish(result).expect("stats");
        assert_eq!(stats.total, 2);
        assert_eq!(cache.state(), &StatsState::Empty);

        assert!(cache.begin(&store).is_none());
        cache.finish(recompute(&store)).expect("stats");
        assert!(matches!(cache.state(), StatsState::Ready { .. }));
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn failed_recompute_after_invalidation_stays_empty() {
        let root = test_root("computing-fail");
        let store = CatalogStore::open(root.join("missing.json"));
        let mut cache = StatsCache::new();

        assert!(cache.begin(&store).is_none());
        let result = recompute(&store);
        cache.invalidate();
        assert!(cache.finish(result).is_err());
        assert_eq!(cache.state(), &StatsState::Empty);
    }

    #[test]
    fn out_of_band_edit_is_detected_on_read() {
        let root = test_root("out-of-band");
        let path = seeded_store(&root);
        let store = CatalogStore::open(&path);
        let mut cache = StatsCache::new();
        assert_eq!(cache.get(&store).expect("stats").total, 2);

        fs::write(&path, r#"[{"id":9,"name":"only","price":4}]"#).expect("edit");
        let stats = cache.get(&store).expect("stats");
        assert_eq!(stats.total, 1);
        assert_eq!(stats.average_price, 4.0);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn deleted_file_surfaces_error_instead_of_stale_figures() {
        let root = test_root("deleted");
        let path = seeded_store(&root);
        let store = CatalogStore::open(&path);
        let mut cache = StatsCache::new();
        cache.get(&store).expect("stats");

        fs::remove_file(&path).expect("remove");
        assert!(cache.get(&store).is_err());
        assert_eq!(cache.state(), &StatsState::Empty);
        let _ = fs::remove_dir_all(&root);
    }
}
