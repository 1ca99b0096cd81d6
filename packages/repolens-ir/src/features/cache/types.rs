//! Cache keys and configuration

use serde::{Deserialize, Serialize};

/// What kind of value a cache entry holds; each kind gets its own L1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachedKind {
    /// Per-file IR bundle
    IrBundle,
    GraphNode,
    RelationSet,
    ParsedTree,
}

impl CachedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachedKind::IrBundle => "ir_bundle",
            CachedKind::GraphNode => "graph_node",
            CachedKind::RelationSet => "relation_set",
            CachedKind::ParsedTree => "parsed_tree",
        }
    }
}

/// Cache key scoped by repository; renders as `repo:kind:key` so a commit
/// event can invalidate everything under `repo:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub repo_id: String,
    pub kind: CachedKind,
    pub key: String,
}

impl CacheKey {
    pub fn new(repo_id: impl Into<String>, kind: CachedKind, key: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            kind,
            key: key.into(),
        }
    }

    pub fn render(&self) -> String {
        format!("{}:{}:{}", self.repo_id, self.kind.as_str(), self.key)
    }

    /// Prefix covering every key of a repository
    pub fn repo_prefix(repo_id: &str) -> String {
        format!("{}:", repo_id)
    }

    /// Prefix covering one file's entries across kinds is not expressible
    /// with the `repo:kind:key` layout; file-scoped invalidation renders
    /// one key per kind instead.
    pub fn file_keys(repo_id: &str, file_path: &str) -> Vec<CacheKey> {
        [
            CachedKind::IrBundle,
            CachedKind::GraphNode,
            CachedKind::RelationSet,
            CachedKind::ParsedTree,
        ]
        .into_iter()
        .map(|kind| CacheKey::new(repo_id, kind, file_path))
        .collect()
    }
}

/// Per-tier sizing
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// L1 entries per cached type
    pub l1_size_per_type: usize,
    /// L2 time-to-live in seconds
    pub l2_ttl_seconds: u64,
    /// L2 entry ceiling
    pub l2_max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_size_per_type: 2048,
            l2_ttl_seconds: 3600,
            l2_max_entries: 65_536,
        }
    }
}
