//! Delta layers
//!
//! A delta is O(pending changes), never a snapshot clone. Nodes and edges
//! in the delta shadow those in the base; lookups check the delta first.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::shared::models::{Diagnostic, Edge, Node};

/// One uncommitted edit: replace (or delete) a file's source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEdit {
    pub file_path: String,
    /// None deletes the file
    pub new_source: Option<String>,
}

impl FileEdit {
    pub fn replace(file_path: impl Into<String>, new_source: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            new_source: Some(new_source.into()),
        }
    }

    pub fn delete(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            new_source: None,
        }
    }
}

/// Failure description carried by an errored delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorGraphSnapshot {
    pub file_path: String,
    pub message: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Copy-on-write delta on top of a base snapshot
#[derive(Debug, Clone, Default)]
pub struct DeltaLayer {
    pub patch_id: String,
    pub base_snapshot_id: String,
    pub added_nodes: Vec<Node>,
    pub removed_node_ids: HashSet<String>,
    pub added_edges: Vec<Edge>,
    pub removed_edge_ids: HashSet<String>,
    /// Set when patch application failed; queries fall back to the last
    /// good state for the affected file
    pub error: Option<ErrorGraphSnapshot>,
}

impl DeltaLayer {
    pub fn new(patch_id: impl Into<String>, base_snapshot_id: impl Into<String>) -> Self {
        Self {
            patch_id: patch_id.into(),
            base_snapshot_id: base_snapshot_id.into(),
            ..Default::default()
        }
    }

    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    pub fn change_count(&self) -> usize {
        self.added_nodes.len()
            + self.removed_node_ids.len()
            + self.added_edges.len()
            + self.removed_edge_ids.len()
    }
}
