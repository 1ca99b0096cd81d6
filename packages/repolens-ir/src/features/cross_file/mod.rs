//! Cross-file resolution
//!
//! Builds the global symbol table, resolves imports to definitions,
//! rewrites reference edges to canonical node ids, and derives the file
//! dependency DAG with a deterministic build order. The symbol table and
//! DAG are derived state: regenerated on load, never persisted as truth.

mod dep_graph;
mod import_resolver;
mod symbol_table;
mod types;

pub use dep_graph::{DependencyGraph, PageRankConfig};
pub use import_resolver::{collect_imports, rewrite_edge_targets, ImportResolver};
pub use symbol_table::SymbolTable;
pub use types::{ImportInfo, ResolutionMethod, ResolutionStats, ResolvedImport, Symbol};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use crate::shared::models::FileIr;

/// Result of one cross-file resolution run
pub struct GlobalContext {
    pub symbol_table: Arc<SymbolTable>,
    pub resolved_imports: HashMap<String, Vec<ResolvedImport>>,
    pub dependency_graph: DependencyGraph,
    pub topological_order: Vec<String>,
    pub stats: ResolutionStats,
}

impl GlobalContext {
    pub fn dependents_of(&self, file_path: &str) -> Vec<String> {
        self.dependency_graph.dependents_of(file_path)
    }
}

/// Build the global context over a set of per-file IR units.
///
/// Phases: symbol table (parallel) → import resolution (parallel) → edge
/// rewrite → dependency DAG. O(N + E) in symbols and import edges.
pub fn build_global_context(files: &mut [FileIr]) -> GlobalContext {
    let start = Instant::now();

    let symbol_table = Arc::new(SymbolTable::build(files));

    let resolver = ImportResolver::new(&symbol_table);
    let resolved_imports = resolver.resolve_all(files);

    rewrite_edge_targets(files, &symbol_table);

    let dependency_graph = DependencyGraph::build(&resolved_imports);
    let topological_order = dependency_graph.topological_order();

    let (resolved_count, unresolved_count) = resolved_imports
        .values()
        .flatten()
        .fold((0, 0), |(ok, missing), import| {
            if import.is_external {
                (ok, missing + 1)
            } else {
                (ok + 1, missing)
            }
        });

    let stats = ResolutionStats {
        symbols_collected: symbol_table.len(),
        imports_resolved: resolved_count,
        imports_unresolved: unresolved_count,
        dependencies_found: dependency_graph.edge_count(),
        cycles_detected: dependency_graph.cycles().len(),
        duration_ms: start.elapsed().as_millis() as u64,
    };
    tracing::info!(
        symbols = stats.symbols_collected,
        imports = stats.imports_resolved,
        unresolved = stats.imports_unresolved,
        cycles = stats.cycles_detected,
        duration_ms = stats.duration_ms,
        "cross-file resolution complete"
    );

    GlobalContext {
        symbol_table,
        resolved_imports,
        dependency_graph,
        topological_order,
        stats,
    }
}

/// Changed files plus their transitive dependents (BFS over the reverse
/// dependency index)
pub fn compute_affected_files(
    changed: &[String],
    dependents: &HashMap<String, Vec<String>>,
) -> Vec<String> {
    let mut affected = HashSet::new();
    let mut queue: VecDeque<String> = changed.iter().cloned().collect();

    while let Some(path) = queue.pop_front() {
        if affected.insert(path.clone()) {
            if let Some(deps) = dependents.get(&path) {
                for dep in deps {
                    if !affected.contains(dep) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }
    }

    let mut out: Vec<String> = affected.into_iter().collect();
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{Edge, EdgeKind, Node, NodeKind, Span};

    fn func(id: &str, fqn: &str, path: &str, name: &str) -> Node {
        Node::new(id, NodeKind::Function, fqn, path, Span::new(1, 0, 3, 0))
            .with_language("python")
            .with_name(name)
    }

    fn file(path: &str, module: &str, nodes: Vec<Node>, edges: Vec<Edge>) -> FileIr {
        let mut f = FileIr::new(path, "python", module);
        f.nodes = nodes;
        f.edges = edges;
        f
    }

    #[test]
    fn test_empty_repository_resolves_cleanly() {
        let mut files: Vec<FileIr> = vec![];
        let ctx = build_global_context(&mut files);
        assert_eq!(ctx.stats.symbols_collected, 0);
        assert!(ctx.topological_order.is_empty());
    }

    #[test]
    fn test_three_file_import_chain() {
        // utils defines u; helpers imports u and defines h; main imports h
        let utils = file(
            "utils.py",
            "utils",
            vec![func("python:utils.py:utils.u", "utils.u", "utils.py", "u")],
            vec![],
        );
        let helpers = file(
            "helpers.py",
            "helpers",
            vec![func("python:helpers.py:helpers.h", "helpers.h", "helpers.py", "h")],
            vec![Edge::new(
                "e1",
                EdgeKind::Imports,
                "python:helpers.py:helpers.h",
                "utils.u",
            )],
        );
        let main = file(
            "main.py",
            "main",
            vec![func("python:main.py:main.m", "main.m", "main.py", "m")],
            vec![Edge::new(
                "e1",
                EdgeKind::Imports,
                "python:main.py:main.m",
                "helpers.h",
            )],
        );

        let mut files = vec![utils, helpers, main];
        let ctx = build_global_context(&mut files);

        assert!(ctx.stats.symbols_collected >= 3);
        assert_eq!(ctx.stats.imports_resolved, 2);
        assert_eq!(
            ctx.topological_order,
            vec!["utils.py", "helpers.py", "main.py"]
        );

        // Import edges rewritten to canonical node ids
        let helpers_ir = files.iter().find(|f| f.file_path == "helpers.py").unwrap();
        assert_eq!(
            helpers_ir.edges[0].target_id,
            "python:utils.py:utils.u"
        );
    }

    #[test]
    fn test_affected_files_bfs() {
        let mut dependents = HashMap::new();
        dependents.insert("utils.py".to_string(), vec!["helpers.py".to_string()]);
        dependents.insert("helpers.py".to_string(), vec!["main.py".to_string()]);

        let affected = compute_affected_files(&["utils.py".to_string()], &dependents);
        assert_eq!(affected, vec!["helpers.py", "main.py", "utils.py"]);
    }

    #[test]
    fn test_circular_import_still_orders() {
        let a = file(
            "a.py",
            "a",
            vec![func("python:a.py:a.fa", "a.fa", "a.py", "fa")],
            vec![Edge::new("e1", EdgeKind::Imports, "python:a.py:a.fa", "b.fb")],
        );
        let b = file(
            "b.py",
            "b",
            vec![func("python:b.py:b.fb", "b.fb", "b.py", "fb")],
            vec![Edge::new("e1", EdgeKind::Imports, "python:b.py:b.fb", "a.fa")],
        );

        let mut files = vec![a, b];
        let ctx = build_global_context(&mut files);
        assert_eq!(ctx.stats.cycles_detected, 1);
        assert_eq!(ctx.topological_order.len(), 2);
    }

    #[test]
    fn test_resolver_idempotent() {
        let utils = file(
            "utils.py",
            "utils",
            vec![func("python:utils.py:utils.u", "utils.u", "utils.py", "u")],
            vec![],
        );
        let main = file(
            "main.py",
            "main",
            vec![func("python:main.py:main.m", "main.m", "main.py", "m")],
            vec![Edge::new("e1", EdgeKind::Imports, "python:main.py:main.m", "utils.u")],
        );

        let mut files = vec![utils, main];
        let first = build_global_context(&mut files);
        let first_table = first.symbol_table.to_hashmap();
        let first_edges: Vec<_> = files[1].edges.clone();

        let second = build_global_context(&mut files);
        let second_table = second.symbol_table.to_hashmap();

        assert_eq!(first_table.len(), second_table.len());
        assert_eq!(files[1].edges, first_edges);
    }
}
