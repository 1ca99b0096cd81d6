//! L2: distributed cache port
//!
//! Cluster-shared tier. The concrete back-end is an external adapter; the
//! in-memory stand-in (moka) backs tests and single-process deployments.

use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Distributed cache contract: byte-valued, prefix-invalidatable
pub trait DistributedCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<Vec<u8>>>;
    fn set(&self, key: String, value: Arc<Vec<u8>>);
    fn invalidate(&self, key: &str);
    fn invalidate_prefix(&self, prefix: &str);
}

/// Process-local stand-in behind the distributed-cache port
pub struct InMemoryDistributedCache {
    inner: Cache<String, Arc<Vec<u8>>>,
}

impl InMemoryDistributedCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        Self { inner }
    }
}

impl DistributedCache for InMemoryDistributedCache {
    fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&self, key: String, value: Arc<Vec<u8>>) {
        self.inner.insert(key, value);
    }

    fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }

    fn invalidate_prefix(&self, prefix: &str) {
        let prefix = prefix.to_string();
        if let Err(error) = self
            .inner
            .invalidate_entries_if(move |k, _| k.starts_with(&prefix))
        {
            tracing::warn!(%error, "L2 prefix invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> InMemoryDistributedCache {
        InMemoryDistributedCache::new(1024, Duration::from_secs(60))
    }

    #[test]
    fn test_set_get_invalidate() {
        let l2 = cache();
        l2.set("k1".into(), Arc::new(vec![1, 2, 3]));
        assert_eq!(l2.get("k1").as_deref(), Some(&vec![1, 2, 3]));
        l2.invalidate("k1");
        assert!(l2.get("k1").is_none());
    }

    #[test]
    fn test_prefix_invalidation() {
        let l2 = cache();
        l2.set("repo1:a".into(), Arc::new(vec![1]));
        l2.set("repo2:a".into(), Arc::new(vec![2]));
        l2.invalidate_prefix("repo1:");
        // moka applies invalidation predicates lazily; reads observe it
        assert!(l2.get("repo1:a").is_none());
        assert!(l2.get("repo2:a").is_some());
    }
}
