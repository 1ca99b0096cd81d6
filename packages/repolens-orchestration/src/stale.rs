//! Stale edge management
//!
//! When a file changes, edges originating in other files that target its
//! symbols are marked stale with a timestamp. Validation is lazy (on
//! query); a sweep removes edges that stay stale past the TTL.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashSet;

use repolens_ir::IrDocument;

pub struct StaleEdgeTracker {
    /// edge id → when it went stale
    stale: DashMap<String, DateTime<Utc>>,
    ttl: Duration,
}

impl StaleEdgeTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            stale: DashMap::new(),
            ttl,
        }
    }

    /// Default TTL of 24 hours
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::hours(24))
    }

    pub fn stale_count(&self) -> usize {
        self.stale.len()
    }

    pub fn is_stale(&self, edge_id: &str) -> bool {
        self.stale.contains_key(edge_id)
    }

    /// Mark cross-file edges targeting symbols in `changed_file`
    pub fn mark_file_changed(&self, doc: &IrDocument, changed_file: &str) -> usize {
        let changed_nodes: HashSet<&str> = doc
            .nodes
            .iter()
            .filter(|n| n.file_path == changed_file)
            .map(|n| n.id.as_str())
            .collect();
        let node_files: std::collections::HashMap<&str, &str> = doc
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n.file_path.as_str()))
            .collect();

        let now = Utc::now();
        let mut marked = 0;
        for edge in &doc.edges {
            if !changed_nodes.contains(edge.target_id.as_str()) {
                continue;
            }
            let source_file = node_files.get(edge.source_id.as_str()).copied();
            // Only edges originating elsewhere go stale; the changed
            // file's own edges are rebuilt outright.
            if source_file.is_some() && source_file != Some(changed_file) {
                self.stale.insert(edge.id.clone(), now);
                marked += 1;
            }
        }
        tracing::debug!(file = changed_file, marked, "marked stale edges");
        marked
    }

    /// Lazy validation on query: if the target still exists the edge is
    /// fresh again; if not, the caller should drop it. Returns whether the
    /// edge survives.
    pub fn validate(&self, doc: &IrDocument, edge_id: &str) -> bool {
        if !self.is_stale(edge_id) {
            return true;
        }
        let edge = match doc.edges.iter().find(|e| e.id == edge_id) {
            Some(edge) => edge,
            None => {
                self.stale.remove(edge_id);
                return false;
            }
        };
        let target_exists = doc.nodes.iter().any(|n| n.id == edge.target_id);
        if target_exists {
            self.stale.remove(edge_id);
            true
        } else {
            false
        }
    }

    /// Background sweep: drop (from the document and the tracker) edges
    /// stale past the TTL whose targets no longer exist; refresh the rest.
    pub fn sweep(&self, doc: &mut IrDocument, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.ttl;
        let expired: Vec<String> = self
            .stale
            .iter()
            .filter(|entry| *entry.value() < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for edge_id in expired {
            let target_exists = doc
                .edges
                .iter()
                .find(|e| e.id == edge_id)
                .map(|e| doc.nodes.iter().any(|n| n.id == e.target_id))
                .unwrap_or(false);
            if target_exists {
                self.stale.remove(&edge_id);
            } else {
                doc.edges.retain(|e| e.id != edge_id);
                self.stale.remove(&edge_id);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "stale edge sweep removed dangling edges");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_ir::{Edge, EdgeKind, Node, NodeKind, Span};

    fn doc() -> IrDocument {
        let mut doc = IrDocument::empty("repo", "s1");
        doc.nodes.push(
            Node::new("python:a.py:a.f", NodeKind::Function, "a.f", "a.py", Span::zero())
                .with_language("python"),
        );
        doc.nodes.push(
            Node::new("python:b.py:b.g", NodeKind::Function, "b.g", "b.py", Span::zero())
                .with_language("python"),
        );
        doc.edges.push(Edge::new(
            "e1",
            EdgeKind::Calls,
            "python:a.py:a.f",
            "python:b.py:b.g",
        ));
        doc
    }

    #[test]
    fn test_cross_file_edges_marked() {
        let doc = doc();
        let tracker = StaleEdgeTracker::with_default_ttl();
        // b.py changed; a.py's call into it goes stale
        let marked = tracker.mark_file_changed(&doc, "b.py");
        assert_eq!(marked, 1);
        assert!(tracker.is_stale("e1"));
    }

    #[test]
    fn test_same_file_edges_not_marked() {
        let doc = doc();
        let tracker = StaleEdgeTracker::with_default_ttl();
        let marked = tracker.mark_file_changed(&doc, "a.py");
        assert_eq!(marked, 0);
    }

    #[test]
    fn test_lazy_validation_refreshes_live_target() {
        let doc = doc();
        let tracker = StaleEdgeTracker::with_default_ttl();
        tracker.mark_file_changed(&doc, "b.py");
        // Target still exists → edge survives and freshens
        assert!(tracker.validate(&doc, "e1"));
        assert!(!tracker.is_stale("e1"));
    }

    #[test]
    fn test_lazy_validation_fails_dead_target() {
        let mut doc = doc();
        let tracker = StaleEdgeTracker::with_default_ttl();
        tracker.mark_file_changed(&doc, "b.py");
        doc.remove_file("b.py");
        assert!(!tracker.validate(&doc, "e1"));
    }

    #[test]
    fn test_sweep_removes_expired_dangling_edges() {
        let mut doc = doc();
        let tracker = StaleEdgeTracker::new(Duration::hours(24));
        tracker.mark_file_changed(&doc, "b.py");
        doc.nodes.retain(|n| n.file_path != "b.py");

        // Not yet past TTL: nothing removed
        assert_eq!(tracker.sweep(&mut doc, Utc::now()), 0);
        assert_eq!(doc.edges.len(), 1);

        // Past TTL: dangling edge removed
        let removed = tracker.sweep(&mut doc, Utc::now() + Duration::hours(25));
        assert_eq!(removed, 1);
        assert!(doc.edges.is_empty());
    }
}
