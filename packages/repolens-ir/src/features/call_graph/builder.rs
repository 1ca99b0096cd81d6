//! Context-insensitive call graph
//!
//! Merges CALLS (and INSTANTIATES) edges by (caller, callee). Adjacency is
//! kept sorted so traversals are deterministic.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::shared::models::{EdgeKind, IrDocument};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallGraphStats {
    pub functions: usize,
    pub call_edges: usize,
    pub call_sites: usize,
}

/// Merged call graph over one IR document
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    /// caller → callees (sorted, deduplicated)
    callees: BTreeMap<String, BTreeSet<String>>,
    /// callee → callers
    callers: BTreeMap<String, BTreeSet<String>>,
    call_sites: usize,
}

impl CallGraph {
    pub fn build(doc: &IrDocument) -> Self {
        let mut graph = Self::default();
        for edge in &doc.edges {
            if !matches!(edge.kind, EdgeKind::Calls | EdgeKind::Instantiates) {
                continue;
            }
            graph.call_sites += 1;
            graph
                .callees
                .entry(edge.source_id.clone())
                .or_default()
                .insert(edge.target_id.clone());
            graph
                .callers
                .entry(edge.target_id.clone())
                .or_default()
                .insert(edge.source_id.clone());
        }
        graph
    }

    pub fn callees_of(&self, node_id: &str) -> Vec<String> {
        self.callees
            .get(node_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn callers_of(&self, node_id: &str) -> Vec<String> {
        self.callers
            .get(node_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Nodes reachable along CALLS edges (excluding the start), DFS in
    /// deterministic order
    pub fn reachable_from(&self, node_id: &str) -> Vec<String> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut order: Vec<String> = Vec::new();
        let mut stack = vec![node_id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(next) = self.callees.get(&current) {
                // Reverse so the smallest id is processed first
                for callee in next.iter().rev() {
                    if !visited.contains(callee) {
                        visited.insert(callee.clone());
                        order.push(callee.clone());
                        stack.push(callee.clone());
                    }
                }
            }
        }
        order
    }

    /// (caller, callee) pairs within `depth` hops of `node_id`, both
    /// directions bounded independently
    pub fn subgraph_from(&self, node_id: &str, depth: usize) -> Vec<(String, String)> {
        let mut edges: BTreeSet<(String, String)> = BTreeSet::new();
        let mut frontier = vec![node_id.to_string()];
        for _ in 0..depth {
            let mut next_frontier = Vec::new();
            for current in &frontier {
                for callee in self.callees_of(current) {
                    if edges.insert((current.clone(), callee.clone())) {
                        next_frontier.push(callee);
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }
        edges.into_iter().collect()
    }

    pub fn stats(&self) -> CallGraphStats {
        CallGraphStats {
            functions: self.callees.len(),
            call_edges: self.callees.values().map(|s| s.len()).sum(),
            call_sites: self.call_sites,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{Edge, Node, NodeKind, Span};

    fn doc_with_calls(calls: &[(&str, &str)]) -> IrDocument {
        let mut doc = IrDocument::empty("repo", "s1");
        let mut seen = std::collections::HashSet::new();
        for (i, (caller, callee)) in calls.iter().enumerate() {
            for id in [caller, callee] {
                if seen.insert(id.to_string()) {
                    doc.nodes.push(
                        Node::new(*id, NodeKind::Function, *id, "t.py", Span::zero())
                            .with_language("python"),
                    );
                }
            }
            doc.edges.push(Edge::new(
                format!("e{}", i),
                EdgeKind::Calls,
                *caller,
                *callee,
            ));
        }
        doc
    }

    #[test]
    fn test_merge_by_caller_callee() {
        // Two call sites, one merged edge
        let doc = doc_with_calls(&[("a", "b"), ("a", "b")]);
        let graph = CallGraph::build(&doc);
        assert_eq!(graph.callees_of("a"), vec!["b"]);
        assert_eq!(graph.stats().call_edges, 1);
        assert_eq!(graph.stats().call_sites, 2);
    }

    #[test]
    fn test_reachability() {
        let doc = doc_with_calls(&[("a", "b"), ("b", "c"), ("c", "a")]);
        let graph = CallGraph::build(&doc);
        let reachable = graph.reachable_from("a");
        assert!(reachable.contains(&"b".to_string()));
        assert!(reachable.contains(&"c".to_string()));
        // Cycle back to `a` is fine; traversal terminates
        assert!(reachable.contains(&"a".to_string()));
    }

    #[test]
    fn test_callers_reverse_index() {
        let doc = doc_with_calls(&[("a", "c"), ("b", "c")]);
        let graph = CallGraph::build(&doc);
        assert_eq!(graph.callers_of("c"), vec!["a", "b"]);
    }

    #[test]
    fn test_subgraph_depth_bound() {
        let doc = doc_with_calls(&[("a", "b"), ("b", "c"), ("c", "d")]);
        let graph = CallGraph::build(&doc);
        let subgraph = graph.subgraph_from("a", 2);
        assert!(subgraph.contains(&("a".into(), "b".into())));
        assert!(subgraph.contains(&("b".into(), "c".into())));
        assert!(!subgraph.contains(&("c".into(), "d".into())));
    }

    #[test]
    fn test_deterministic_traversal() {
        let doc = doc_with_calls(&[("a", "c"), ("a", "b"), ("b", "d"), ("c", "d")]);
        let graph = CallGraph::build(&doc);
        assert_eq!(graph.reachable_from("a"), graph.reachable_from("a"));
    }
}
