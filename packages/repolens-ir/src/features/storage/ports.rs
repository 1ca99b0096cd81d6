//! Storage ports
//!
//! The core depends on these contracts only; concrete back-ends
//! (PostgreSQL, a graph database, a vector store) are external adapters.
//! Every method is scoped by (repo_id, snapshot_id).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::shared::models::{Edge, IrDocument, Node, Result};

/// Snapshot listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub snapshot_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Tagged snapshots are exempt from retention GC
    pub tagged: bool,
}

/// IR document persistence
#[async_trait]
pub trait IrStore: Send + Sync {
    async fn save(&self, doc: &IrDocument) -> Result<()>;

    async fn load(&self, repo_id: &str, snapshot_id: &str) -> Result<Option<IrDocument>>;

    async fn list_snapshots(&self, repo_id: &str) -> Result<Vec<SnapshotInfo>>;

    async fn delete(&self, repo_id: &str, snapshot_id: &str) -> Result<()>;
}

/// Graph projection of the IR (nodes and relations as flat collections)
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_nodes(&self, repo_id: &str, snapshot_id: &str, nodes: &[Node]) -> Result<()>;

    async fn upsert_edges(&self, repo_id: &str, snapshot_id: &str, edges: &[Edge]) -> Result<()>;

    async fn delete_nodes_for_files(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        file_paths: &[String],
    ) -> Result<()>;

    async fn query_callers(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        node_id: &str,
    ) -> Result<Vec<String>>;

    async fn query_callees(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        node_id: &str,
    ) -> Result<Vec<String>>;

    async fn query_imports(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        file_path: &str,
    ) -> Result<Vec<String>>;

    async fn query_imported_by(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        file_path: &str,
    ) -> Result<Vec<String>>;
}

/// Retrieval chunk persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub file_path: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqn: Option<String>,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn save_chunks(&self, repo_id: &str, snapshot_id: &str, chunks: &[Chunk]) -> Result<()>;

    async fn get_chunks_by_file(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        file_path: &str,
    ) -> Result<Vec<Chunk>>;

    async fn delete_chunks_by_file(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        file_path: &str,
    ) -> Result<()>;
}
