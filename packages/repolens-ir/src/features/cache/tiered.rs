//! Tiered cache facade
//!
//! Read path: L1 → L2 → loader (L3: authoritative store or reparse), with
//! promotion to the faster tiers on hit. Write path: write-through — both
//! in-memory tiers take the value synchronously; the persistent tier is
//! the caller's store. Invalidation: whole-repo prefix or single key.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::l1::L1Cache;
use super::l2::DistributedCache;
use super::types::CacheKey;
use crate::shared::models::Result;

#[derive(Debug, Default)]
pub struct TierMetrics {
    pub l1_hits: AtomicU64,
    pub l2_hits: AtomicU64,
    pub loads: AtomicU64,
    pub misses: AtomicU64,
}

impl TierMetrics {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.l1_hits.load(Ordering::Relaxed) + self.l2_hits.load(Ordering::Relaxed);
        let total = hits + self.loads.load(Ordering::Relaxed) + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

pub struct TieredCache<T> {
    l1: L1Cache<T>,
    l2: Arc<dyn DistributedCache>,
    metrics: TierMetrics,
}

impl<T> TieredCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(l1_capacity: usize, l2: Arc<dyn DistributedCache>) -> Self {
        Self {
            l1: L1Cache::new(l1_capacity),
            l2,
            metrics: TierMetrics::default(),
        }
    }

    pub fn l1(&self) -> &L1Cache<T> {
        &self.l1
    }

    pub fn metrics(&self) -> &TierMetrics {
        &self.metrics
    }

    /// Tiered lookup with promotion
    pub fn get(&self, key: &CacheKey) -> Option<Arc<T>> {
        let rendered = key.render();

        if let Some(value) = self.l1.get(&rendered) {
            self.metrics.l1_hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        if let Some(bytes) = self.l2.get(&rendered) {
            if let Ok(value) = serde_json::from_slice::<T>(&bytes) {
                let value = Arc::new(value);
                self.l1.insert(rendered, Arc::clone(&value));
                self.metrics.l2_hits.fetch_add(1, Ordering::Relaxed);
                return Some(value);
            }
            // Corrupt L2 payload: drop it and fall through
            self.l2.invalidate(&rendered);
        }

        None
    }

    /// Tiered lookup, falling back to the authoritative loader on miss.
    /// The loaded value backfills the faster tiers.
    pub fn get_or_load<F>(&self, key: &CacheKey, load: F) -> Result<Option<Arc<T>>>
    where
        F: FnOnce() -> Result<Option<T>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(Some(value));
        }

        match load()? {
            Some(value) => {
                self.metrics.loads.fetch_add(1, Ordering::Relaxed);
                let value = Arc::new(value);
                self.set(key, Arc::clone(&value))?;
                Ok(Some(value))
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Write-through to both in-memory tiers
    pub fn set(&self, key: &CacheKey, value: Arc<T>) -> Result<()> {
        let rendered = key.render();
        let bytes = serde_json::to_vec(&*value)?;
        self.l1.insert(rendered.clone(), value);
        self.l2.set(rendered, Arc::new(bytes));
        Ok(())
    }

    pub fn invalidate(&self, key: &CacheKey) {
        let rendered = key.render();
        self.l1.invalidate(&rendered);
        self.l2.invalidate(&rendered);
    }

    /// A commit or overlay-apply event for a repo invalidates `repo:*`
    pub fn invalidate_repo(&self, repo_id: &str) {
        let prefix = CacheKey::repo_prefix(repo_id);
        self.l1.invalidate_prefix(&prefix);
        self.l2.invalidate_prefix(&prefix);
    }

    /// Finer file-scoped invalidation
    pub fn invalidate_file(&self, repo_id: &str, file_path: &str) {
        for key in CacheKey::file_keys(repo_id, file_path) {
            self.invalidate(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::cache::l2::InMemoryDistributedCache;
    use crate::features::cache::types::CachedKind;
    use std::time::Duration;

    fn tiered() -> TieredCache<String> {
        let l2 = Arc::new(InMemoryDistributedCache::new(
            1024,
            Duration::from_secs(60),
        ));
        TieredCache::new(16, l2)
    }

    fn key(repo: &str, file: &str) -> CacheKey {
        CacheKey::new(repo, CachedKind::IrBundle, file)
    }

    #[test]
    fn test_get_or_load_backfills() {
        let cache = tiered();
        let k = key("r1", "a.py");

        let loaded = cache
            .get_or_load(&k, || Ok(Some("ir".to_string())))
            .unwrap();
        assert_eq!(loaded.as_deref(), Some(&"ir".to_string()));

        // Second read is an L1 hit; loader must not run
        let hit = cache
            .get_or_load(&k, || panic!("loader must not run"))
            .unwrap();
        assert_eq!(hit.as_deref(), Some(&"ir".to_string()));
        assert_eq!(cache.metrics().l1_hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_l2_promotes_to_l1() {
        let cache = tiered();
        let k = key("r1", "a.py");
        cache.set(&k, Arc::new("ir".to_string())).unwrap();

        // Evict from L1 only
        cache.l1().invalidate(&k.render());
        assert!(cache.get(&k).is_some());
        assert_eq!(cache.metrics().l2_hits.load(Ordering::Relaxed), 1);
        // Promoted: next read hits L1
        assert!(cache.get(&k).is_some());
        assert_eq!(cache.metrics().l1_hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_repo_invalidation_spares_other_repos() {
        let cache = tiered();
        cache.set(&key("r1", "a.py"), Arc::new("x".into())).unwrap();
        cache.set(&key("r2", "a.py"), Arc::new("y".into())).unwrap();

        cache.invalidate_repo("r1");
        assert!(cache.get(&key("r1", "a.py")).is_none());
        assert!(cache.get(&key("r2", "a.py")).is_some());
    }

    #[test]
    fn test_file_scoped_invalidation() {
        let cache = tiered();
        cache.set(&key("r1", "a.py"), Arc::new("x".into())).unwrap();
        cache.set(&key("r1", "b.py"), Arc::new("y".into())).unwrap();

        cache.invalidate_file("r1", "a.py");
        assert!(cache.get(&key("r1", "a.py")).is_none());
        assert!(cache.get(&key("r1", "b.py")).is_some());
    }

    #[test]
    fn test_miss_reported() {
        let cache = tiered();
        let missing = cache
            .get_or_load(&key("r1", "nope.py"), || Ok(None))
            .unwrap();
        assert!(missing.is_none());
        assert_eq!(cache.metrics().misses.load(Ordering::Relaxed), 1);
    }
}
