//! Query API
//!
//! The surface consumed by agents, CLIs, and servers: fused search,
//! definition/reference lookup, call-graph subgraphs, impact reports, and
//! overlay operations for what-if analyses.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::features::call_graph::CallGraph;
use crate::features::ir_generation::GeneratorRegistry;
use crate::features::overlay::{FileEdit, OverlayConfig, OverlayEngine, SpeculativeResult};
use crate::features::parsing::SourceParser;
use crate::features::retrieval::{
    FusionRetriever, QueryIntent, RankedResults, SearchHit, SearchIndex, Strategy,
};
use crate::shared::models::{EdgeKind, IrDocument, IrError, Node, Result, Span};

/// A reference site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub file_path: String,
    pub span: Span,
    pub edge_kind: String,
}

/// Kind of change driving an impact query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    BodyLocal,
    Signature,
    Interface,
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactReport {
    pub changed_fqn: String,
    pub change_kind: ChangeKind,
    /// Functions calling the changed symbol directly
    pub direct_callers: Vec<String>,
    /// Files that need re-resolution under this change kind
    pub affected_files: Vec<String>,
}

/// Call-graph subgraph: merged (caller, callee) pairs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subgraph {
    pub root: String,
    pub edges: Vec<(String, String)>,
}

pub struct QueryService {
    doc: Arc<IrDocument>,
    call_graph: CallGraph,
    fqn_index: HashMap<String, usize>,
    overlay: Mutex<OverlayEngine>,
    fusion: FusionRetriever,
    indexes: Vec<Arc<dyn SearchIndex>>,
}

impl QueryService {
    pub fn new(
        doc: Arc<IrDocument>,
        parser: Arc<dyn SourceParser>,
        generators: Arc<GeneratorRegistry>,
        indexes: Vec<Arc<dyn SearchIndex>>,
    ) -> Self {
        let call_graph = CallGraph::build(&doc);
        let fqn_index = doc
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.fqn.clone(), i))
            .collect();
        let overlay = Mutex::new(OverlayEngine::new(
            Arc::clone(&doc),
            parser,
            generators,
            OverlayConfig::default(),
        ));
        Self {
            doc,
            call_graph,
            fqn_index,
            overlay,
            fusion: FusionRetriever::default(),
            indexes,
        }
    }

    pub fn document(&self) -> &Arc<IrDocument> {
        &self.doc
    }

    // ── Search ──────────────────────────────────────────────────────────

    /// Fusion retrieval across all registered strategies. A failing
    /// strategy degrades gracefully; only an empty strategy set produces
    /// an empty result.
    pub async fn search(
        &self,
        query: &str,
        intent_hint: Option<QueryIntent>,
        limit: usize,
    ) -> RankedResults {
        let mut per_strategy: Vec<(Strategy, Vec<SearchHit>)> = Vec::new();
        let mut failed: Vec<Strategy> = Vec::new();

        for index in &self.indexes {
            match index.search(query, limit).await {
                Ok(hits) => per_strategy.push((index.strategy(), hits)),
                Err(error) => {
                    tracing::warn!(strategy = index.strategy().as_str(), %error, "strategy failed");
                    failed.push(index.strategy());
                }
            }
        }

        self.fusion.fuse(query, intent_hint, &per_strategy, &failed)
    }

    // ── Definitions and references ──────────────────────────────────────

    pub fn get_definition(&self, fqn: &str) -> Option<&Node> {
        self.fqn_index.get(fqn).map(|i| &self.doc.nodes[*i])
    }

    /// All edges referring to a symbol (calls, imports, references,
    /// instantiations, inheritance)
    pub fn get_references(&self, fqn: &str) -> Vec<Location> {
        let node = match self.get_definition(fqn) {
            Some(node) => node,
            None => return Vec::new(),
        };
        let node_by_id: HashMap<&str, &Node> =
            self.doc.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut locations: Vec<Location> = self
            .doc
            .edges
            .iter()
            .filter(|e| e.target_id == node.id)
            .filter(|e| {
                matches!(
                    e.kind,
                    EdgeKind::Calls
                        | EdgeKind::Imports
                        | EdgeKind::References
                        | EdgeKind::Instantiates
                        | EdgeKind::Inherits
                )
            })
            .map(|e| {
                let file_path = node_by_id
                    .get(e.source_id.as_str())
                    .map(|n| n.file_path.clone())
                    .unwrap_or_default();
                Location {
                    file_path,
                    span: e.span.unwrap_or_default(),
                    edge_kind: e.kind.as_str().to_string(),
                }
            })
            .collect();
        locations.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then(a.span.start_line.cmp(&b.span.start_line))
        });
        locations
    }

    // ── Call graph and impact ───────────────────────────────────────────

    pub fn call_graph_from(&self, from_fqn: &str, depth: usize) -> Result<Subgraph> {
        let node = self
            .get_definition(from_fqn)
            .ok_or_else(|| IrError::resolution(format!("unknown symbol {}", from_fqn)))?;
        Ok(Subgraph {
            root: node.id.clone(),
            edges: self.call_graph.subgraph_from(&node.id, depth),
        })
    }

    pub fn impact(&self, changed_fqn: &str, change_kind: ChangeKind) -> Result<ImpactReport> {
        let node = self
            .get_definition(changed_fqn)
            .ok_or_else(|| IrError::resolution(format!("unknown symbol {}", changed_fqn)))?;

        let direct_callers = self.call_graph.callers_of(&node.id);

        let node_by_id: HashMap<&str, &Node> =
            self.doc.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut affected_files: Vec<String> = match change_kind {
            // Body-local changes stay inside the defining file
            ChangeKind::BodyLocal => vec![node.file_path.clone()],
            // Signature changes pull in every direct caller's file
            ChangeKind::Signature => direct_callers
                .iter()
                .filter_map(|caller| node_by_id.get(caller.as_str()))
                .map(|n| n.file_path.clone())
                .chain(std::iter::once(node.file_path.clone()))
                .collect(),
            // Interface/global changes pull in every importer of the file
            ChangeKind::Interface | ChangeKind::Global => {
                let file_nodes: std::collections::HashSet<&str> = self
                    .doc
                    .nodes
                    .iter()
                    .filter(|n| n.file_path == node.file_path)
                    .map(|n| n.id.as_str())
                    .collect();
                self.doc
                    .edges
                    .iter()
                    .filter(|e| {
                        e.kind == EdgeKind::Imports && file_nodes.contains(e.target_id.as_str())
                    })
                    .filter_map(|e| node_by_id.get(e.source_id.as_str()))
                    .map(|n| n.file_path.clone())
                    .chain(std::iter::once(node.file_path.clone()))
                    .collect()
            }
        };
        affected_files.sort();
        affected_files.dedup();

        Ok(ImpactReport {
            changed_fqn: changed_fqn.to_string(),
            change_kind,
            direct_callers,
            affected_files,
        })
    }

    // ── Overlay operations ──────────────────────────────────────────────

    /// Apply uncommitted edits; returns the patch id
    pub fn overlay_apply(&self, edits: &[FileEdit]) -> Result<String> {
        let patch_id = uuid::Uuid::new_v4().to_string();
        let mut overlay = self.overlay.lock();
        overlay.apply_patch(&patch_id, edits)?;
        Ok(patch_id)
    }

    pub fn overlay_commit(&self, patch_id: &str, new_snapshot_id: &str) -> Result<Arc<IrDocument>> {
        self.overlay.lock().commit(patch_id, new_snapshot_id)
    }

    pub fn overlay_rollback(&self, patch_id: &str) -> Result<()> {
        self.overlay.lock().rollback(patch_id)
    }

    /// Definition lookup against the virtual (overlaid) view
    pub fn overlay_get_definition(&self, fqn: &str) -> Option<Node> {
        self.overlay.lock().view_node_by_fqn(fqn).cloned()
    }

    pub fn preview_rename(&self, from_fqn: &str, to_name: &str) -> Result<SpeculativeResult> {
        self.overlay.lock().preview_rename(from_fqn, to_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ir_generation::{IrGenerator, PythonIrGenerator};
    use crate::features::parsing::TreeSitterParser;

    fn service(files: &[(&str, &str)]) -> QueryService {
        let parser = Arc::new(TreeSitterParser::python());
        let generator = PythonIrGenerator::new();
        let mut doc = IrDocument::empty("repo", "branch:main@abc");
        for (path, source) in files {
            let tree = parser.parse(source, path).unwrap();
            doc.merge_file(generator.generate(&tree, None).unwrap());
        }
        QueryService::new(
            Arc::new(doc),
            parser,
            Arc::new(GeneratorRegistry::with_defaults()),
            vec![],
        )
    }

    #[test]
    fn test_get_definition_and_references() {
        let svc = service(&[(
            "app.py",
            "def helper():\n    pass\n\ndef main():\n    helper()\n",
        )]);
        let def = svc.get_definition("app.helper").expect("definition");
        assert_eq!(def.display_name(), "helper");

        let refs = svc.get_references("app.helper");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].edge_kind, "CALLS");
    }

    #[test]
    fn test_call_graph_subgraph() {
        let svc = service(&[(
            "app.py",
            "def c():\n    pass\n\ndef b():\n    c()\n\ndef a():\n    b()\n",
        )]);
        let subgraph = svc.call_graph_from("app.a", 5).unwrap();
        assert_eq!(subgraph.edges.len(), 2);
    }

    #[test]
    fn test_impact_signature_includes_callers() {
        let svc = service(&[(
            "app.py",
            "def target():\n    pass\n\ndef caller():\n    target()\n",
        )]);
        let report = svc.impact("app.target", ChangeKind::Signature).unwrap();
        assert_eq!(report.direct_callers.len(), 1);
        assert!(report.affected_files.contains(&"app.py".to_string()));
    }

    #[test]
    fn test_overlay_round_trip() {
        let svc = service(&[("app.py", "def f():\n    pass\n")]);
        let patch = svc
            .overlay_apply(&[FileEdit::replace("app.py", "def g():\n    pass\n")])
            .unwrap();
        assert!(svc.overlay_get_definition("app.g").is_some());

        svc.overlay_rollback(&patch).unwrap();
        assert!(svc.overlay_get_definition("app.f").is_some());
        assert!(svc.overlay_get_definition("app.g").is_none());
    }

    #[tokio::test]
    async fn test_search_with_no_strategies_is_empty() {
        let svc = service(&[("app.py", "def f():\n    pass\n")]);
        let results = svc.search("anything", None, 10).await;
        assert!(results.results.is_empty());
    }
}
