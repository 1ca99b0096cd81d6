//! In-memory storage adapters
//!
//! DashMap-backed implementations of the storage ports, used by tests and
//! single-process deployments. Snapshots are immutable once saved; `save`
//! on an existing (repo, snapshot) pair is rejected.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;

use super::ports::{Chunk, ChunkStore, GraphStore, IrStore, SnapshotInfo};
use crate::shared::models::{Edge, EdgeKind, IrDocument, IrError, Node, Result};

type SnapshotKey = (String, String);

fn key(repo_id: &str, snapshot_id: &str) -> SnapshotKey {
    (repo_id.to_string(), snapshot_id.to_string())
}

#[derive(Default)]
pub struct InMemoryIrStore {
    docs: DashMap<SnapshotKey, (IrDocument, SnapshotInfo)>,
}

impl InMemoryIrStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(&self, repo_id: &str, snapshot_id: &str) {
        if let Some(mut entry) = self.docs.get_mut(&key(repo_id, snapshot_id)) {
            entry.1.tagged = true;
        }
    }
}

#[async_trait]
impl IrStore for InMemoryIrStore {
    async fn save(&self, doc: &IrDocument) -> Result<()> {
        let k = key(&doc.repo_id, &doc.snapshot_id);
        if self.docs.contains_key(&k) {
            return Err(IrError::storage(format!(
                "snapshot {} already committed; snapshots are immutable",
                doc.snapshot_id
            )));
        }
        let info = SnapshotInfo {
            snapshot_id: doc.snapshot_id.clone(),
            created_at: Utc::now(),
            tagged: false,
        };
        self.docs.insert(k, (doc.clone(), info));
        Ok(())
    }

    async fn load(&self, repo_id: &str, snapshot_id: &str) -> Result<Option<IrDocument>> {
        Ok(self
            .docs
            .get(&key(repo_id, snapshot_id))
            .map(|entry| entry.0.clone()))
    }

    async fn list_snapshots(&self, repo_id: &str) -> Result<Vec<SnapshotInfo>> {
        let mut snapshots: Vec<SnapshotInfo> = self
            .docs
            .iter()
            .filter(|entry| entry.key().0 == repo_id)
            .map(|entry| entry.value().1.clone())
            .collect();
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(snapshots)
    }

    async fn delete(&self, repo_id: &str, snapshot_id: &str) -> Result<()> {
        self.docs.remove(&key(repo_id, snapshot_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryGraphStore {
    nodes: DashMap<SnapshotKey, Vec<Node>>,
    edges: DashMap<SnapshotKey, Vec<Edge>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn file_of_node(nodes: &[Node], node_id: &str) -> Option<String> {
        nodes
            .iter()
            .find(|n| n.id == node_id)
            .map(|n| n.file_path.clone())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_nodes(&self, repo_id: &str, snapshot_id: &str, nodes: &[Node]) -> Result<()> {
        let mut entry = self.nodes.entry(key(repo_id, snapshot_id)).or_default();
        let incoming: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        entry.retain(|n| !incoming.contains(n.id.as_str()));
        entry.extend(nodes.iter().cloned());
        Ok(())
    }

    async fn upsert_edges(&self, repo_id: &str, snapshot_id: &str, edges: &[Edge]) -> Result<()> {
        let mut entry = self.edges.entry(key(repo_id, snapshot_id)).or_default();
        let incoming: HashSet<&str> = edges.iter().map(|e| e.id.as_str()).collect();
        entry.retain(|e| !incoming.contains(e.id.as_str()));
        entry.extend(edges.iter().cloned());
        Ok(())
    }

    async fn delete_nodes_for_files(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        file_paths: &[String],
    ) -> Result<()> {
        let k = key(repo_id, snapshot_id);
        let files: HashSet<&String> = file_paths.iter().collect();
        let removed_ids: HashSet<String> = match self.nodes.get_mut(&k) {
            Some(mut nodes) => {
                let removed = nodes
                    .iter()
                    .filter(|n| files.contains(&n.file_path))
                    .map(|n| n.id.clone())
                    .collect();
                nodes.retain(|n| !files.contains(&n.file_path));
                removed
            }
            None => return Ok(()),
        };
        if let Some(mut edges) = self.edges.get_mut(&k) {
            edges.retain(|e| !removed_ids.contains(&e.source_id));
        }
        Ok(())
    }

    async fn query_callers(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        node_id: &str,
    ) -> Result<Vec<String>> {
        let k = key(repo_id, snapshot_id);
        let mut out: Vec<String> = self
            .edges
            .get(&k)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|e| e.kind == EdgeKind::Calls && e.target_id == node_id)
                    .map(|e| e.source_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn query_callees(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        node_id: &str,
    ) -> Result<Vec<String>> {
        let k = key(repo_id, snapshot_id);
        let mut out: Vec<String> = self
            .edges
            .get(&k)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|e| e.kind == EdgeKind::Calls && e.source_id == node_id)
                    .map(|e| e.target_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn query_imports(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        file_path: &str,
    ) -> Result<Vec<String>> {
        let k = key(repo_id, snapshot_id);
        let nodes = self.nodes.get(&k);
        let edges = self.edges.get(&k);
        let (nodes, edges) = match (nodes, edges) {
            (Some(n), Some(e)) => (n, e),
            _ => return Ok(Vec::new()),
        };
        let sources: HashSet<&str> = nodes
            .iter()
            .filter(|n| n.file_path == file_path)
            .map(|n| n.id.as_str())
            .collect();
        let mut out: Vec<String> = edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Imports && sources.contains(e.source_id.as_str()))
            .filter_map(|e| Self::file_of_node(&nodes, &e.target_id))
            .filter(|target_file| target_file != file_path)
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn query_imported_by(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        file_path: &str,
    ) -> Result<Vec<String>> {
        let k = key(repo_id, snapshot_id);
        let nodes = self.nodes.get(&k);
        let edges = self.edges.get(&k);
        let (nodes, edges) = match (nodes, edges) {
            (Some(n), Some(e)) => (n, e),
            _ => return Ok(Vec::new()),
        };
        let targets: HashSet<&str> = nodes
            .iter()
            .filter(|n| n.file_path == file_path)
            .map(|n| n.id.as_str())
            .collect();
        let mut out: Vec<String> = edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Imports && targets.contains(e.target_id.as_str()))
            .filter_map(|e| Self::file_of_node(&nodes, &e.source_id))
            .filter(|source_file| source_file != file_path)
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }
}

#[derive(Default)]
pub struct InMemoryChunkStore {
    chunks: DashMap<SnapshotKey, Vec<Chunk>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn save_chunks(&self, repo_id: &str, snapshot_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut entry = self.chunks.entry(key(repo_id, snapshot_id)).or_default();
        let incoming: HashSet<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        entry.retain(|c| !incoming.contains(c.chunk_id.as_str()));
        entry.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn get_chunks_by_file(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        file_path: &str,
    ) -> Result<Vec<Chunk>> {
        Ok(self
            .chunks
            .get(&key(repo_id, snapshot_id))
            .map(|chunks| {
                chunks
                    .iter()
                    .filter(|c| c.file_path == file_path)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_chunks_by_file(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        file_path: &str,
    ) -> Result<()> {
        if let Some(mut chunks) = self.chunks.get_mut(&key(repo_id, snapshot_id)) {
            chunks.retain(|c| c.file_path != file_path);
        }
        Ok(())
    }
}
