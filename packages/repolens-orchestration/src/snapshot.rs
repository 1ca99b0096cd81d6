//! Snapshot lifecycle
//!
//! Snapshot ids name immutable versions (`branch:<name>@<commit>` or
//! `workspace:<user>@local-dirty`). Retention keeps the latest N and
//! everything younger than the age limit; tagged snapshots are kept
//! forever. GC cascades through the storage ports in one pass.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use repolens_ir::features::storage::{ChunkStore, GraphStore, IrStore};

use crate::error::{OrchestratorError, Result};

/// Mint a branch snapshot id
pub fn branch_snapshot_id(branch: &str, commit: &str) -> String {
    format!("branch:{}@{}", branch, commit)
}

/// Mint a dirty-workspace snapshot id
pub fn workspace_snapshot_id(user: &str) -> String {
    format!("workspace:{}@local-dirty", user)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Keep at least the latest N snapshots
    pub keep_count: usize,
    /// Keep snapshots younger than this many days
    pub keep_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_count: 10,
            keep_days: 30,
        }
    }
}

pub struct SnapshotManager {
    ir_store: Arc<dyn IrStore>,
    graph_store: Arc<dyn GraphStore>,
    chunk_store: Arc<dyn ChunkStore>,
    policy: RetentionPolicy,
}

impl SnapshotManager {
    pub fn new(
        ir_store: Arc<dyn IrStore>,
        graph_store: Arc<dyn GraphStore>,
        chunk_store: Arc<dyn ChunkStore>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            ir_store,
            graph_store,
            chunk_store,
            policy,
        }
    }

    /// Apply the retention policy: delete snapshots beyond keep_count that
    /// are also older than keep_days, skipping tagged ones. Deletion
    /// cascades to graph rows and chunks. Returns the deleted ids.
    pub async fn gc(&self, repo_id: &str) -> Result<Vec<String>> {
        let mut snapshots = self
            .ir_store
            .list_snapshots(repo_id)
            .await
            .map_err(OrchestratorError::Ir)?;
        // Newest first
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let cutoff = Utc::now() - Duration::days(self.policy.keep_days);
        let mut deleted = Vec::new();

        for (index, info) in snapshots.iter().enumerate() {
            if info.tagged {
                continue; // tagged snapshots live forever
            }
            if index < self.policy.keep_count {
                continue;
            }
            if info.created_at >= cutoff {
                continue;
            }

            let files = self
                .ir_store
                .load(repo_id, &info.snapshot_id)
                .await
                .map_err(OrchestratorError::Ir)?
                .map(|doc| doc.file_paths())
                .unwrap_or_default();

            // Cascade: graph rows, chunks, then the document itself
            self.graph_store
                .delete_nodes_for_files(repo_id, &info.snapshot_id, &files)
                .await
                .map_err(OrchestratorError::Ir)?;
            for file in &files {
                self.chunk_store
                    .delete_chunks_by_file(repo_id, &info.snapshot_id, file)
                    .await
                    .map_err(OrchestratorError::Ir)?;
            }
            self.ir_store
                .delete(repo_id, &info.snapshot_id)
                .await
                .map_err(OrchestratorError::Ir)?;

            tracing::info!(snapshot = %info.snapshot_id, "snapshot garbage collected");
            deleted.push(info.snapshot_id.clone());
        }

        Ok(deleted)
    }
}
