//! Overlay engine
//!
//! Maintains a stack of delta layers over an immutable base snapshot.
//! Virtual IR queries merge on read and never mutate the base; commit
//! folds deltas into a new snapshot; rollback is O(1) for the top layer
//! and O(k) otherwise.

use std::collections::HashSet;
use std::sync::Arc;

use crate::features::flow_graph::build_flow_graphs;
use crate::features::ir_generation::GeneratorRegistry;
use crate::features::parsing::SourceParser;
use crate::shared::models::{Edge, EdgeKind, FileIr, IrDocument, IrError, Node, Result};

use super::delta::{DeltaLayer, ErrorGraphSnapshot, FileEdit};

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Maximum stacked deltas; the oldest is evicted beyond this
    pub max_layers: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self { max_layers: 10 }
    }
}

/// Result of a speculative rename over a virtual view
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpeculativeResult {
    pub from_fqn: String,
    pub to_fqn: String,
    pub affected_sites: usize,
    /// (edge id, old target, new target)
    pub redirected_edges: Vec<(String, String, String)>,
    pub unresolved_references: usize,
}

pub struct OverlayEngine {
    base: Arc<IrDocument>,
    layers: Vec<DeltaLayer>,
    config: OverlayConfig,
    parser: Arc<dyn SourceParser>,
    generators: Arc<GeneratorRegistry>,
}

impl OverlayEngine {
    pub fn new(
        base: Arc<IrDocument>,
        parser: Arc<dyn SourceParser>,
        generators: Arc<GeneratorRegistry>,
        config: OverlayConfig,
    ) -> Self {
        Self {
            base,
            layers: Vec::new(),
            config,
            parser,
            generators,
        }
    }

    pub fn base(&self) -> &Arc<IrDocument> {
        &self.base
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, patch_id: &str) -> Option<&DeltaLayer> {
        self.layers.iter().find(|l| l.patch_id == patch_id)
    }

    /// Apply a patch, producing a new delta layer. Re-applying the same
    /// patch id is a no-op. A parse error in any edited file marks the
    /// delta `error` and leaves the last good state in place.
    pub fn apply_patch(&mut self, patch_id: &str, edits: &[FileEdit]) -> Result<&DeltaLayer> {
        if self.layers.iter().any(|l| l.patch_id == patch_id) {
            // Idempotent within a session
            return Ok(self
                .layers
                .iter()
                .find(|l| l.patch_id == patch_id)
                .expect("layer just found"));
        }

        if self.layers.len() >= self.config.max_layers {
            let evicted = self.layers.remove(0);
            tracing::warn!(
                patch = %evicted.patch_id,
                "overlay layer limit reached, evicting oldest delta"
            );
        }

        let mut delta = DeltaLayer::new(patch_id, self.base.snapshot_id.clone());

        for edit in edits {
            match &edit.new_source {
                None => self.record_file_removal(&mut delta, &edit.file_path),
                Some(source) => {
                    let tree = self.parser.parse(source, &edit.file_path)?;
                    if tree.has_errors {
                        delta.error = Some(ErrorGraphSnapshot {
                            file_path: edit.file_path.clone(),
                            message: format!(
                                "patch produced {} syntax error(s)",
                                tree.errors.len()
                            ),
                            diagnostics: Vec::new(),
                        });
                        // Reject the file's changes; keep the last good state.
                        continue;
                    }
                    let generator = self
                        .generators
                        .get(self.parser.language_name())
                        .ok_or_else(|| {
                            IrError::overlay(format!(
                                "no generator for language {}",
                                self.parser.language_name()
                            ))
                        })?;
                    let mut file_ir = generator.generate(&tree, None)?;
                    build_flow_graphs(&tree, &mut file_ir);
                    crate::features::data_flow::emit_data_flow(&mut file_ir);

                    self.record_file_removal(&mut delta, &edit.file_path);
                    self.record_file_addition(&mut delta, file_ir);
                }
            }
        }

        self.layers.push(delta);
        Ok(self.layers.last().expect("layer just pushed"))
    }

    fn record_file_removal(&self, delta: &mut DeltaLayer, file_path: &str) {
        let removed_nodes: HashSet<String> = self
            .view_nodes()
            .filter(|n| n.file_path == file_path)
            .map(|n| n.id.clone())
            .collect();
        for edge in self.view_edges() {
            if removed_nodes.contains(&edge.source_id) {
                delta.removed_edge_ids.insert(edge.id.clone());
            }
        }
        delta.removed_node_ids.extend(removed_nodes);
    }

    fn record_file_addition(&self, delta: &mut DeltaLayer, file_ir: FileIr) {
        delta.added_nodes.extend(file_ir.nodes);
        delta.added_edges.extend(file_ir.edges);
    }

    /// Fold the delta (and everything below it) into a new base snapshot.
    /// The delta stack above the committed patch stays in place.
    pub fn commit(&mut self, patch_id: &str, new_snapshot_id: &str) -> Result<Arc<IrDocument>> {
        let index = self
            .layers
            .iter()
            .position(|l| l.patch_id == patch_id)
            .ok_or_else(|| IrError::overlay(format!("unknown patch {}", patch_id)))?;

        let folded: Vec<DeltaLayer> = self.layers.drain(..=index).collect();
        let mut doc = (*self.base).clone();
        doc.snapshot_id = new_snapshot_id.to_string();
        for layer in &folded {
            apply_layer(&mut doc, layer);
        }
        self.base = Arc::new(doc);
        Ok(Arc::clone(&self.base))
    }

    /// Discard a delta. LIFO rollback is O(1); rolling back a middle patch
    /// costs O(k) in the layers above it (the stack is rebuilt without the
    /// removed layer).
    pub fn rollback(&mut self, patch_id: &str) -> Result<()> {
        match self.layers.last() {
            Some(last) if last.patch_id == patch_id => {
                self.layers.pop();
                Ok(())
            }
            _ => {
                let index = self
                    .layers
                    .iter()
                    .position(|l| l.patch_id == patch_id)
                    .ok_or_else(|| IrError::overlay(format!("unknown patch {}", patch_id)))?;
                self.layers.remove(index);
                Ok(())
            }
        }
    }

    pub fn rollback_all(&mut self) {
        self.layers.clear();
    }

    // ── Virtual IR queries (merge-on-read) ──────────────────────────────

    /// Nodes visible through the overlay: delta first, then base
    pub fn view_nodes(&self) -> impl Iterator<Item = &Node> {
        let mut seen: HashSet<&str> = HashSet::new();
        let removed: HashSet<String> = self
            .layers
            .iter()
            .flat_map(|l| l.removed_node_ids.iter().cloned())
            .collect();

        let mut out: Vec<&Node> = Vec::new();
        for layer in self.layers.iter().rev() {
            for node in &layer.added_nodes {
                if seen.insert(node.id.as_str()) {
                    out.push(node);
                }
            }
        }
        for node in &self.base.nodes {
            if !removed.contains(&node.id) && seen.insert(node.id.as_str()) {
                out.push(node);
            }
        }
        out.into_iter()
    }

    pub fn view_edges(&self) -> impl Iterator<Item = &Edge> {
        let removed: HashSet<String> = self
            .layers
            .iter()
            .flat_map(|l| l.removed_edge_ids.iter().cloned())
            .collect();

        let mut out: Vec<&Edge> = Vec::new();
        for layer in self.layers.iter().rev() {
            for edge in &layer.added_edges {
                out.push(edge);
            }
        }
        for edge in &self.base.edges {
            if !removed.contains(&edge.id) {
                out.push(edge);
            }
        }
        out.into_iter()
    }

    pub fn view_node_by_fqn(&self, fqn: &str) -> Option<&Node> {
        self.view_nodes().find(|n| n.fqn == fqn)
    }

    /// Materialize the overlay into a standalone document (for call-graph
    /// and impact queries). The layers themselves never hold a clone; this
    /// is a query-time product.
    pub fn materialize(&self, snapshot_id: &str) -> IrDocument {
        let mut doc = (*self.base).clone();
        doc.snapshot_id = snapshot_id.to_string();
        for layer in &self.layers {
            apply_layer(&mut doc, layer);
        }
        doc
    }

    /// "What-if" rename preview over the virtual view; never mutates the
    /// base.
    pub fn preview_rename(&self, from_fqn: &str, to_name: &str) -> Result<SpeculativeResult> {
        let node = self
            .view_node_by_fqn(from_fqn)
            .ok_or_else(|| IrError::overlay(format!("unknown symbol {}", from_fqn)))?;

        let to_fqn = match from_fqn.rsplit_once('.') {
            Some((prefix, _)) => format!("{}.{}", prefix, to_name),
            None => to_name.to_string(),
        };
        let new_id = crate::shared::utils::ids::node_id(&node.language, &node.file_path, &to_fqn);
        let old_id = node.id.clone();

        let mut redirected = Vec::new();
        for edge in self.view_edges() {
            if edge.target_id == old_id
                && matches!(
                    edge.kind,
                    EdgeKind::Calls
                        | EdgeKind::References
                        | EdgeKind::Imports
                        | EdgeKind::Instantiates
                        | EdgeKind::Inherits
                        | EdgeKind::Decorates
                )
            {
                redirected.push((edge.id.clone(), old_id.clone(), new_id.clone()));
            }
        }
        redirected.sort();

        Ok(SpeculativeResult {
            from_fqn: from_fqn.to_string(),
            to_fqn,
            affected_sites: redirected.len(),
            redirected_edges: redirected,
            unresolved_references: 0,
        })
    }
}

fn apply_layer(doc: &mut IrDocument, layer: &DeltaLayer) {
    doc.nodes.retain(|n| !layer.removed_node_ids.contains(&n.id));
    doc.edges.retain(|e| !layer.removed_edge_ids.contains(&e.id));
    doc.nodes.extend(layer.added_nodes.iter().cloned());
    doc.edges.extend(layer.added_edges.iter().cloned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ir_generation::{IrGenerator, PythonIrGenerator};
    use crate::features::parsing::TreeSitterParser;

    fn base_doc(files: &[(&str, &str)]) -> Arc<IrDocument> {
        let parser = TreeSitterParser::python();
        let generator = PythonIrGenerator::new();
        let mut doc = IrDocument::empty("repo", "branch:main@abc");
        for (path, source) in files {
            let tree = parser.parse(source, path).unwrap();
            let ir = generator.generate(&tree, None).unwrap();
            doc.merge_file(ir);
        }
        Arc::new(doc)
    }

    fn engine(base: Arc<IrDocument>) -> OverlayEngine {
        OverlayEngine::new(
            base,
            Arc::new(TreeSitterParser::python()),
            Arc::new(GeneratorRegistry::with_defaults()),
            OverlayConfig::default(),
        )
    }

    #[test]
    fn test_apply_patch_shadows_base() {
        let base = base_doc(&[("app.py", "def old():\n    pass\n")]);
        let mut overlay = engine(Arc::clone(&base));

        overlay
            .apply_patch("p1", &[FileEdit::replace("app.py", "def new():\n    pass\n")])
            .unwrap();

        assert!(overlay.view_node_by_fqn("app.new").is_some());
        assert!(overlay.view_node_by_fqn("app.old").is_none());
        // Base untouched
        assert!(base.node_by_fqn("app.old").is_some());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let base = base_doc(&[("app.py", "def f():\n    pass\n")]);
        let mut overlay = engine(base);

        overlay
            .apply_patch("p1", &[FileEdit::replace("app.py", "def g():\n    pass\n")])
            .unwrap();
        let count_after_first = overlay.layer_count();
        overlay
            .apply_patch("p1", &[FileEdit::replace("app.py", "def h():\n    pass\n")])
            .unwrap();
        assert_eq!(overlay.layer_count(), count_after_first);
        // Second application was a no-op
        assert!(overlay.view_node_by_fqn("app.g").is_some());
        assert!(overlay.view_node_by_fqn("app.h").is_none());
    }

    #[test]
    fn test_rollback_all_restores_base_view() {
        let base = base_doc(&[("app.py", "def f():\n    pass\n")]);
        let mut overlay = engine(Arc::clone(&base));

        overlay
            .apply_patch("p1", &[FileEdit::replace("app.py", "def g():\n    pass\n")])
            .unwrap();
        overlay
            .apply_patch("p2", &[FileEdit::replace("app.py", "def h():\n    pass\n")])
            .unwrap();
        overlay.rollback_all();

        let visible: Vec<&str> = overlay.view_nodes().map(|n| n.id.as_str()).collect();
        let base_ids: Vec<&str> = base.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(visible.len(), base_ids.len());
        for id in base_ids {
            assert!(visible.contains(&id));
        }
    }

    #[test]
    fn test_lifo_and_non_lifo_rollback() {
        let base = base_doc(&[("a.py", "def fa():\n    pass\n"), ("b.py", "def fb():\n    pass\n")]);
        let mut overlay = engine(base);

        overlay
            .apply_patch("p1", &[FileEdit::replace("a.py", "def fa2():\n    pass\n")])
            .unwrap();
        overlay
            .apply_patch("p2", &[FileEdit::replace("b.py", "def fb2():\n    pass\n")])
            .unwrap();

        // Non-LIFO: roll back the bottom patch
        overlay.rollback("p1").unwrap();
        assert!(overlay.view_node_by_fqn("a.fa").is_some());
        assert!(overlay.view_node_by_fqn("b.fb2").is_some());

        // LIFO: top patch pops
        overlay.rollback("p2").unwrap();
        assert!(overlay.view_node_by_fqn("b.fb").is_some());
        assert_eq!(overlay.layer_count(), 0);
    }

    #[test]
    fn test_layer_limit_evicts_oldest() {
        let base = base_doc(&[("app.py", "def f():\n    pass\n")]);
        let mut overlay = OverlayEngine::new(
            base,
            Arc::new(TreeSitterParser::python()),
            Arc::new(GeneratorRegistry::with_defaults()),
            OverlayConfig { max_layers: 2 },
        );

        for i in 0..3 {
            overlay
                .apply_patch(
                    &format!("p{}", i),
                    &[FileEdit::replace("app.py", format!("def f{}():\n    pass\n", i))],
                )
                .unwrap();
        }
        assert_eq!(overlay.layer_count(), 2);
        assert!(overlay.layer("p0").is_none());
        assert!(overlay.layer("p2").is_some());
    }

    #[test]
    fn test_parse_error_marks_delta_errored() {
        let base = base_doc(&[("app.py", "def f():\n    pass\n")]);
        let mut overlay = engine(base);

        let layer = overlay
            .apply_patch("bad", &[FileEdit::replace("app.py", "def broken(:\n")])
            .unwrap();
        assert!(layer.is_errored());

        // Last good state still served
        assert!(overlay.view_node_by_fqn("app.f").is_some());
    }

    #[test]
    fn test_commit_folds_into_new_base() {
        let base = base_doc(&[("app.py", "def f():\n    pass\n")]);
        let mut overlay = engine(base);

        overlay
            .apply_patch("p1", &[FileEdit::replace("app.py", "def g():\n    pass\n")])
            .unwrap();
        let new_base = overlay.commit("p1", "workspace:dev@local-dirty").unwrap();

        assert_eq!(overlay.layer_count(), 0);
        assert_eq!(new_base.snapshot_id, "workspace:dev@local-dirty");
        assert!(new_base.node_by_fqn("app.g").is_some());
        assert!(new_base.node_by_fqn("app.f").is_none());
    }

    #[test]
    fn test_preview_rename_counts_sites() {
        let source = "def old_name():\n    pass\n\ndef a():\n    old_name()\n\ndef b():\n    old_name()\n";
        let base = base_doc(&[("app.py", source)]);
        let overlay = engine(base);

        let preview = overlay.preview_rename("app.old_name", "new_name").unwrap();
        assert_eq!(preview.affected_sites, 2);
        assert_eq!(preview.to_fqn, "app.new_name");
        assert_eq!(preview.unresolved_references, 0);
        for (_, old, new) in &preview.redirected_edges {
            assert!(old.ends_with("old_name"));
            assert!(new.ends_with("new_name"));
        }
    }
}
