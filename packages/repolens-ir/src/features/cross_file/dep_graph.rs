//! File dependency DAG
//!
//! petgraph-backed directed graph (A → B means A depends on B) with Tarjan
//! SCC cycle detection, a deterministic topological order (cycle members
//! appended sorted by path, with a warning), transitive queries, and
//! PageRank file importance.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::types::ResolvedImport;

/// PageRank configuration
#[derive(Debug, Clone)]
pub struct PageRankConfig {
    pub damping: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    path_to_node: HashMap<String, NodeIndex>,
    cycles: Vec<Vec<String>>,
    topo_order: Vec<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            path_to_node: HashMap::new(),
            cycles: Vec::new(),
            topo_order: Vec::new(),
        }
    }

    /// Build from resolved imports: an edge A → B for every import in A
    /// that resolved to a symbol defined in B.
    pub fn build(resolved_imports: &HashMap<String, Vec<ResolvedImport>>) -> Self {
        let mut graph = DiGraph::new();
        let mut path_to_node = HashMap::new();

        let mut all_files: BTreeSet<String> = resolved_imports.keys().cloned().collect();
        for imports in resolved_imports.values() {
            for import in imports {
                if let Some(source_file) = &import.source_file {
                    all_files.insert(source_file.clone());
                }
            }
        }

        for file_path in &all_files {
            let idx = graph.add_node(file_path.clone());
            path_to_node.insert(file_path.clone(), idx);
        }

        let mut seen_edges: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
        for (from_path, imports) in resolved_imports {
            let from_idx = match path_to_node.get(from_path) {
                Some(idx) => *idx,
                None => continue,
            };
            for import in imports {
                if let Some(source_file) = &import.source_file {
                    if source_file == from_path {
                        continue; // no self-loops
                    }
                    if let Some(&to_idx) = path_to_node.get(source_file) {
                        if seen_edges.insert((from_idx, to_idx)) {
                            graph.add_edge(from_idx, to_idx, ());
                        }
                    }
                }
            }
        }

        let sccs = tarjan_scc(&graph);
        let cycles: Vec<Vec<String>> = sccs
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut members: Vec<String> =
                    scc.into_iter().map(|idx| graph[idx].clone()).collect();
                members.sort();
                members
            })
            .collect();
        for cycle in &cycles {
            tracing::warn!(members = ?cycle, "import cycle detected");
        }

        let topo_order = Self::topological_order_of(&graph, &path_to_node);

        Self {
            graph,
            path_to_node,
            cycles,
            topo_order,
        }
    }

    /// Dependencies-first order. A file is emitted once all of its
    /// dependencies are; cycle members are appended sorted by path, which
    /// keeps the order deterministic for identical input.
    fn topological_order_of(
        graph: &DiGraph<String, ()>,
        path_to_node: &HashMap<String, NodeIndex>,
    ) -> Vec<String> {
        // remaining out-degree = unemitted dependencies
        let mut remaining: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|idx| {
                (
                    idx,
                    graph.neighbors_directed(idx, Direction::Outgoing).count(),
                )
            })
            .collect();

        let mut ready: BTreeSet<String> = remaining
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(idx, _)| graph[*idx].clone())
            .collect();

        let mut order = Vec::with_capacity(graph.node_count());
        let mut emitted: HashSet<NodeIndex> = HashSet::new();

        while let Some(path) = ready.iter().next().cloned() {
            ready.remove(&path);
            let idx = path_to_node[&path];
            emitted.insert(idx);
            order.push(path);

            for dependent in graph.neighbors_directed(idx, Direction::Incoming) {
                if emitted.contains(&dependent) {
                    continue;
                }
                if let Some(deg) = remaining.get_mut(&dependent) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.insert(graph[dependent].clone());
                    }
                }
            }
        }

        // Cycle members never reach zero; append deterministically
        let mut leftover: Vec<String> = graph
            .node_indices()
            .filter(|idx| !emitted.contains(idx))
            .map(|idx| graph[idx].clone())
            .collect();
        leftover.sort();
        order.extend(leftover);

        order
    }

    pub fn dependents_of(&self, file_path: &str) -> Vec<String> {
        self.neighbors(file_path, Direction::Incoming)
    }

    pub fn dependencies_of(&self, file_path: &str) -> Vec<String> {
        self.neighbors(file_path, Direction::Outgoing)
    }

    fn neighbors(&self, file_path: &str, direction: Direction) -> Vec<String> {
        match self.path_to_node.get(file_path) {
            Some(&idx) => {
                let mut out: Vec<String> = self
                    .graph
                    .neighbors_directed(idx, direction)
                    .map(|idx| self.graph[idx].clone())
                    .collect();
                out.sort();
                out
            }
            None => Vec::new(),
        }
    }

    pub fn all_dependents(&self) -> HashMap<String, Vec<String>> {
        self.path_to_node
            .keys()
            .map(|path| (path.clone(), self.dependents_of(path)))
            .collect()
    }

    pub fn all_dependencies(&self) -> HashMap<String, Vec<String>> {
        self.path_to_node
            .keys()
            .map(|path| (path.clone(), self.dependencies_of(path)))
            .collect()
    }

    /// Transitive dependents (BFS over incoming edges)
    pub fn transitive_dependents(&self, file_path: &str) -> Vec<String> {
        self.transitive(file_path, Direction::Incoming)
    }

    pub fn transitive_dependencies(&self, file_path: &str) -> Vec<String> {
        self.transitive(file_path, Direction::Outgoing)
    }

    fn transitive(&self, file_path: &str, direction: Direction) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        if let Some(&idx) = self.path_to_node.get(file_path) {
            queue.push_back(idx);
        }
        while let Some(idx) = queue.pop_front() {
            for neighbor in self.graph.neighbors_directed(idx, direction) {
                if visited.insert(self.graph[neighbor].clone()) {
                    queue.push_back(neighbor);
                }
            }
        }
        let mut out: Vec<String> = visited.into_iter().collect();
        out.sort();
        out
    }

    pub fn topological_order(&self) -> Vec<String> {
        self.topo_order.clone()
    }

    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// PageRank importance per file (power iteration with dangling-node
    /// redistribution)
    pub fn compute_pagerank(&self, config: Option<PageRankConfig>) -> HashMap<String, f64> {
        let config = config.unwrap_or_default();
        let n = self.graph.node_count();
        if n == 0 {
            return HashMap::new();
        }
        let n_f = n as f64;

        let mut scores: HashMap<NodeIndex, f64> = self
            .graph
            .node_indices()
            .map(|idx| (idx, 1.0 / n_f))
            .collect();

        let out_degrees: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                (
                    idx,
                    self.graph.neighbors_directed(idx, Direction::Outgoing).count(),
                )
            })
            .collect();

        for _ in 0..config.max_iterations {
            let dangling_sum: f64 = self
                .graph
                .node_indices()
                .filter(|idx| out_degrees[idx] == 0)
                .map(|idx| scores[&idx])
                .sum();

            let mut next: HashMap<NodeIndex, f64> = HashMap::new();
            let mut max_diff: f64 = 0.0;

            for idx in self.graph.node_indices() {
                let mut score =
                    (1.0 - config.damping) / n_f + config.damping * dangling_sum / n_f;
                for incoming in self.graph.neighbors_directed(idx, Direction::Incoming) {
                    let deg = out_degrees[&incoming] as f64;
                    if deg > 0.0 {
                        score += config.damping * scores[&incoming] / deg;
                    }
                }
                max_diff = max_diff.max((score - scores[&idx]).abs());
                next.insert(idx, score);
            }

            scores = next;
            if max_diff < config.tolerance {
                break;
            }
        }

        scores
            .into_iter()
            .map(|(idx, score)| (self.graph[idx].clone(), score))
            .collect()
    }

    /// Top-k files by PageRank, score-descending with path tie-break
    pub fn critical_files(&self, k: usize, config: Option<PageRankConfig>) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self.compute_pagerank(config).into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::cross_file::types::ResolutionMethod;

    fn resolved(import_fqn: &str, source_file: Option<&str>) -> ResolvedImport {
        match source_file {
            Some(file) => ResolvedImport::resolved(
                import_fqn.to_string(),
                import_fqn.to_string(),
                file.to_string(),
                format!("python:{}:{}", file, import_fqn),
                ResolutionMethod::ExactMatch,
            ),
            None => ResolvedImport::unresolved(import_fqn.to_string()),
        }
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::build(&HashMap::new());
        assert_eq!(graph.node_count(), 0);
        assert!(!graph.has_cycles());
        assert!(graph.topological_order().is_empty());
    }

    #[test]
    fn test_chain_topological_order() {
        let mut imports = HashMap::new();
        imports.insert("main.py".to_string(), vec![resolved("h", Some("helpers.py"))]);
        imports.insert("helpers.py".to_string(), vec![resolved("u", Some("utils.py"))]);

        let graph = DependencyGraph::build(&imports);
        assert_eq!(
            graph.topological_order(),
            vec!["utils.py", "helpers.py", "main.py"]
        );
    }

    #[test]
    fn test_cycle_detected_and_order_still_produced() {
        let mut imports = HashMap::new();
        imports.insert("a.py".to_string(), vec![resolved("b", Some("b.py"))]);
        imports.insert("b.py".to_string(), vec![resolved("a", Some("a.py"))]);

        let graph = DependencyGraph::build(&imports);
        assert!(graph.has_cycles());
        assert_eq!(graph.cycles()[0], vec!["a.py", "b.py"]);

        // Cycle members appear deterministically (sorted)
        let order = graph.topological_order();
        assert_eq!(order, vec!["a.py", "b.py"]);
    }

    #[test]
    fn test_order_is_deterministic() {
        let mut imports = HashMap::new();
        for i in 0..10 {
            imports.insert(
                format!("f{}.py", i),
                vec![resolved("core", Some("core.py"))],
            );
        }
        let a = DependencyGraph::build(&imports).topological_order();
        let b = DependencyGraph::build(&imports).topological_order();
        assert_eq!(a, b);
        assert_eq!(a[0], "core.py");
    }

    #[test]
    fn test_external_imports_ignored() {
        let mut imports = HashMap::new();
        imports.insert("main.py".to_string(), vec![resolved("numpy", None)]);
        let graph = DependencyGraph::build(&imports);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_transitive_dependents() {
        let mut imports = HashMap::new();
        imports.insert("a.py".to_string(), vec![resolved("b", Some("b.py"))]);
        imports.insert("b.py".to_string(), vec![resolved("c", Some("c.py"))]);

        let graph = DependencyGraph::build(&imports);
        assert_eq!(graph.transitive_dependents("c.py"), vec!["a.py", "b.py"]);
        assert_eq!(graph.transitive_dependencies("a.py"), vec!["b.py", "c.py"]);
    }

    #[test]
    fn test_duplicate_imports_collapse_to_one_edge() {
        let mut imports = HashMap::new();
        imports.insert(
            "a.py".to_string(),
            vec![
                resolved("b.x", Some("b.py")),
                resolved("b.y", Some("b.py")),
            ],
        );
        let graph = DependencyGraph::build(&imports);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_pagerank_hub_scores_highest() {
        let mut imports = HashMap::new();
        for i in 1..=5 {
            imports.insert(
                format!("spoke{}.py", i),
                vec![resolved("hub", Some("hub.py"))],
            );
        }
        let graph = DependencyGraph::build(&imports);
        let critical = graph.critical_files(3, None);
        assert_eq!(critical[0].0, "hub.py");
        assert_eq!(critical.len(), 3);

        let scores = graph.compute_pagerank(None);
        let total: f64 = scores.values().sum();
        assert!((total - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_pagerank_deterministic() {
        let mut imports = HashMap::new();
        for i in 0..6 {
            imports.insert(
                format!("f{}.py", i),
                vec![resolved("x", Some(&format!("f{}.py", (i + 1) % 6)))],
            );
        }
        let graph = DependencyGraph::build(&imports);
        let a = graph.compute_pagerank(None);
        let b = graph.compute_pagerank(None);
        for key in a.keys() {
            assert!((a[key] - b[key]).abs() < 1e-12);
        }
    }
}
