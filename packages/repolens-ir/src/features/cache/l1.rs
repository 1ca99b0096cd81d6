//! L1: in-process LRU, one instance per cached type
//!
//! Pinned entries (files currently open in a workspace) never evict; they
//! live beside the LRU and take lookup priority.

use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub struct L1Cache<T> {
    lru: Mutex<LruCache<String, Arc<T>>>,
    pinned: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> L1Cache<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("max(1) is non-zero");
        Self {
            lru: Mutex::new(LruCache::new(capacity)),
            pinned: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        if let Some(value) = self.pinned.lock().get(key) {
            return Some(Arc::clone(value));
        }
        self.lru.lock().get(key).map(Arc::clone)
    }

    pub fn insert(&self, key: String, value: Arc<T>) {
        let mut pinned = self.pinned.lock();
        if pinned.contains_key(&key) {
            pinned.insert(key, value);
            return;
        }
        drop(pinned);
        self.lru.lock().put(key, value);
    }

    /// Pin an entry so eviction never drops it
    pub fn pin(&self, key: &str) {
        let value = self.lru.lock().pop(key);
        if let Some(value) = value {
            self.pinned.lock().insert(key.to_string(), value);
        }
    }

    /// Unpin and return the entry to LRU management
    pub fn unpin(&self, key: &str) {
        let value = self.pinned.lock().remove(key);
        if let Some(value) = value {
            self.lru.lock().put(key.to_string(), value);
        }
    }

    pub fn invalidate(&self, key: &str) {
        self.lru.lock().pop(key);
        self.pinned.lock().remove(key);
    }

    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut lru = self.lru.lock();
        let doomed: Vec<String> = lru
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            lru.pop(&key);
        }
        drop(lru);
        self.pinned.lock().retain(|k, _| !k.starts_with(prefix));
    }

    pub fn len(&self) -> usize {
        self.lru.lock().len() + self.pinned.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lru.lock().clear();
        self.pinned.lock().clear();
    }
}
