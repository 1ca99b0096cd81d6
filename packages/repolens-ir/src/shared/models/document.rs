//! IR documents
//!
//! `FileIr` is the per-file unit produced by a generator. `IrDocument` is
//! one repository snapshot assembled from per-file units; it is the unit of
//! persistence and query, identified by `(repo_id, snapshot_id)`, and
//! immutable once committed to storage.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::cfg::{CfgBlockKind, ControlFlowGraph};
use super::diagnostic::Diagnostic;
use super::edge::Edge;
use super::error::{IrError, Result};
use super::node::{Node, NodeKind};
use super::type_entities::{SignatureEntity, TypeEntity};

/// Current IR schema version (semver). A major-version mismatch on load
/// triggers a full rebuild.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Package-level metadata (optional enrichment)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_paths: Vec<String>,
}

/// Per-file IR produced by one generator run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileIr {
    pub file_path: String,
    pub language: String,
    pub module_path: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub types: Vec<TypeEntity>,
    #[serde(default)]
    pub signatures: Vec<SignatureEntity>,
    #[serde(default)]
    pub control_flow_graphs: Vec<ControlFlowGraph>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl FileIr {
    pub fn new(
        file_path: impl Into<String>,
        language: impl Into<String>,
        module_path: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            language: language.into(),
            module_path: module_path.into(),
            ..Default::default()
        }
    }

    pub fn node_by_fqn(&self, fqn: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.fqn == fqn)
    }

    pub fn signature_for(&self, node_id: &str) -> Option<&SignatureEntity> {
        self.signatures.iter().find(|s| s.owner_node_id == node_id)
    }
}

/// One repository snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrDocument {
    pub repo_id: String,
    /// e.g. `branch:main@<commit>` or `workspace:<user>@local-dirty`
    pub snapshot_id: String,
    pub schema_version: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub types: Vec<TypeEntity>,
    #[serde(default)]
    pub signatures: Vec<SignatureEntity>,
    #[serde(default)]
    pub control_flow_graphs: Vec<ControlFlowGraph>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    pub packages: Vec<PackageMetadata>,
}

impl IrDocument {
    pub fn empty(repo_id: impl Into<String>, snapshot_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            snapshot_id: snapshot_id.into(),
            schema_version: SCHEMA_VERSION.to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
            types: Vec::new(),
            signatures: Vec::new(),
            control_flow_graphs: Vec::new(),
            diagnostics: Vec::new(),
            packages: Vec::new(),
        }
    }

    /// Assemble a snapshot from per-file units
    pub fn from_files(
        repo_id: impl Into<String>,
        snapshot_id: impl Into<String>,
        files: Vec<FileIr>,
    ) -> Self {
        let mut doc = Self::empty(repo_id, snapshot_id);
        for file in files {
            doc.merge_file(file);
        }
        doc
    }

    /// Merge one file's IR into this snapshot, replacing any prior content
    /// for the same path.
    pub fn merge_file(&mut self, file: FileIr) {
        self.remove_file(&file.file_path);
        self.nodes.extend(file.nodes);
        self.edges.extend(file.edges);
        self.types.extend(file.types);
        self.signatures.extend(file.signatures);
        self.control_flow_graphs.extend(file.control_flow_graphs);
        self.diagnostics.extend(file.diagnostics);
    }

    /// Drop all content originating in a file
    pub fn remove_file(&mut self, file_path: &str) {
        let removed: HashSet<String> = self
            .nodes
            .iter()
            .filter(|n| n.file_path == file_path)
            .map(|n| n.id.clone())
            .collect();
        self.nodes.retain(|n| n.file_path != file_path);
        self.edges.retain(|e| !removed.contains(&e.source_id));
        self.signatures.retain(|s| !removed.contains(&s.owner_node_id));
        self.control_flow_graphs
            .retain(|c| !removed.contains(&c.function_node_id));
        self.diagnostics.retain(|d| d.file_path != file_path);
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_by_fqn(&self, fqn: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.fqn == fqn)
    }

    pub fn nodes_in_file<'a>(&'a self, file_path: &'a str) -> impl Iterator<Item = &'a Node> {
        self.nodes.iter().filter(move |n| n.file_path == file_path)
    }

    /// Restartable, non-mutating edge cursor filtered by kind
    pub fn edges_of_kind(&self, kind: super::edge::EdgeKind) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    pub fn file_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .nodes
            .iter()
            .map(|n| n.file_path.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        paths.sort();
        paths
    }

    /// Well-formedness check (spec'd invariants)
    ///
    /// - every edge endpoint is a node in this document or an External* id
    /// - every signature_id points to a signature owned by the referring node
    /// - every CFG has exactly one Entry and one Exit
    /// - parent_id agrees with the CONTAINS edge from the parent
    pub fn validate(&self) -> Result<()> {
        let by_id: HashMap<&str, &Node> = self.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        for edge in &self.edges {
            for endpoint in [&edge.source_id, &edge.target_id] {
                let known = by_id.contains_key(endpoint.as_str());
                let external = by_id
                    .get(endpoint.as_str())
                    .map(|n| n.kind.is_external())
                    .unwrap_or(false)
                    || endpoint.contains(":external:");
                if !known && !external {
                    return Err(IrError::internal(format!(
                        "edge {} references unknown node {}",
                        edge.id, endpoint
                    )));
                }
            }
        }

        let sig_by_id: HashMap<&str, &SignatureEntity> =
            self.signatures.iter().map(|s| (s.id.as_str(), s)).collect();
        for node in &self.nodes {
            if let Some(sig_id) = &node.signature_id {
                match sig_by_id.get(sig_id.as_str()) {
                    Some(sig) if sig.owner_node_id == node.id => {}
                    Some(_) => {
                        return Err(IrError::internal(format!(
                            "signature {} not owned by node {}",
                            sig_id, node.id
                        )))
                    }
                    None => {
                        return Err(IrError::internal(format!(
                            "node {} references missing signature {}",
                            node.id, sig_id
                        )))
                    }
                }
            }
            if let Some(parent_id) = &node.parent_id {
                let has_contains = self.edges.iter().any(|e| {
                    e.kind == super::edge::EdgeKind::Contains
                        && e.source_id == *parent_id
                        && e.target_id == node.id
                });
                if !has_contains {
                    return Err(IrError::internal(format!(
                        "node {} parent_id {} has no matching CONTAINS edge",
                        node.id, parent_id
                    )));
                }
            }
        }

        for cfg in &self.control_flow_graphs {
            let entries = cfg
                .blocks
                .iter()
                .filter(|b| b.kind == CfgBlockKind::Entry)
                .count();
            let exits = cfg
                .blocks
                .iter()
                .filter(|b| b.kind == CfgBlockKind::Exit)
                .count();
            if entries != 1 || exits != 1 {
                return Err(IrError::internal(format!(
                    "cfg for {} has {} entries and {} exits",
                    cfg.function_node_id, entries, exits
                )));
            }
        }

        Ok(())
    }

    /// True when a persisted document's schema is incompatible with this
    /// build (major version differs)
    pub fn needs_full_rebuild(schema_version: &str) -> bool {
        let major = |v: &str| v.split('.').next().map(str::to_string);
        major(schema_version) != major(SCHEMA_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{EdgeKind, Span};

    fn make_node(id: &str, fqn: &str, file: &str) -> Node {
        Node::new(id, NodeKind::Function, fqn, file, Span::new(1, 0, 2, 0)).with_language("python")
    }

    #[test]
    fn test_empty_document_validates() {
        let doc = IrDocument::empty("repo", "branch:main@abc");
        assert!(doc.validate().is_ok());
        assert!(doc.file_paths().is_empty());
    }

    #[test]
    fn test_merge_file_replaces_prior_content() {
        let mut doc = IrDocument::empty("repo", "s1");
        let mut file = FileIr::new("a.py", "python", "a");
        file.nodes.push(make_node("python:a.py:a.f", "a.f", "a.py"));
        doc.merge_file(file.clone());
        doc.merge_file(file);
        assert_eq!(doc.nodes.len(), 1);
    }

    #[test]
    fn test_validate_rejects_dangling_edge() {
        let mut doc = IrDocument::empty("repo", "s1");
        doc.nodes.push(make_node("python:a.py:a.f", "a.f", "a.py"));
        doc.edges.push(Edge::new(
            "e1",
            EdgeKind::Calls,
            "python:a.py:a.f",
            "python:a.py:a.missing",
        ));
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_external_target() {
        let mut doc = IrDocument::empty("repo", "s1");
        doc.nodes.push(make_node("python:a.py:a.f", "a.f", "a.py"));
        doc.edges.push(Edge::new(
            "e1",
            EdgeKind::Calls,
            "python:a.py:a.f",
            "python:external:requests.get",
        ));
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut doc = IrDocument::empty("repo", "s1");
        doc.nodes.push(make_node("python:a.py:a.f", "a.f", "a.py"));
        let json = serde_json::to_string(&doc).unwrap();
        let back: IrDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, back);
    }

    #[test]
    fn test_schema_major_mismatch_forces_rebuild() {
        assert!(!IrDocument::needs_full_rebuild(SCHEMA_VERSION));
        assert!(!IrDocument::needs_full_rebuild("1.9.3"));
        assert!(IrDocument::needs_full_rebuild("2.0.0"));
    }
}
