//! Global symbol table
//!
//! Lock-free concurrent fqn → symbol map built in parallel over per-file
//! IR. Many-to-one fqn entries are allowed only for overloads, which are
//! distinguished by signature hash. O(1) lookups; O(N) construction.

use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use super::types::Symbol;
use crate::shared::models::{FileIr, NodeKind};

/// Node kinds that never enter the symbol table
fn is_indexable(kind: NodeKind) -> bool {
    !matches!(
        kind,
        // Imports are references, not definitions; blocks are structure.
        NodeKind::Import
            | NodeKind::Export
            | NodeKind::Block
            | NodeKind::Condition
            | NodeKind::Loop
            | NodeKind::TryCatch
            | NodeKind::ExternalFunction
            | NodeKind::ExternalSymbol
    )
}

pub struct SymbolTable {
    /// fqn → overload list (usually a single entry)
    symbols: DashMap<String, Vec<Arc<Symbol>>>,
    /// file → fqns defined in this file
    file_symbols: DashMap<String, Vec<String>>,
    /// short name → fqns (partial matching)
    name_to_fqns: DashMap<String, Vec<String>>,
    /// (file, alias) → canonical fqn
    alias_to_fqn: DashMap<(String, String), String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols: DashMap::new(),
            file_symbols: DashMap::new(),
            name_to_fqns: DashMap::new(),
            alias_to_fqn: DashMap::new(),
        }
    }

    /// Build from per-file IR units (parallel)
    pub fn build(files: &[FileIr]) -> Self {
        let table = Self::new();
        files.par_iter().for_each(|file| table.add_file(file));
        table
    }

    /// Index one file's symbols (used by incremental updates too)
    pub fn add_file(&self, file: &FileIr) {
        let mut file_fqns = Vec::with_capacity(file.nodes.len());

        for node in &file.nodes {
            if !is_indexable(node.kind) || node.fqn.is_empty() {
                continue;
            }
            let name = node.display_name().to_string();
            let signature_hash = node
                .signature_id
                .as_ref()
                .and_then(|sig_id| file.signatures.iter().find(|s| &s.id == sig_id))
                .map(|s| s.signature_hash.clone());

            let mut symbol = Symbol::new(
                node.fqn.clone(),
                name.clone(),
                node.kind,
                file.file_path.clone(),
                node.id.clone(),
                node.span,
            )
            .with_visibility(crate::shared::models::Visibility::from_python_name(&name));
            if let Some(hash) = signature_hash {
                symbol = symbol.with_signature_hash(hash);
            }
            let symbol = Arc::new(symbol);

            let mut entry = self.symbols.entry(node.fqn.clone()).or_default();
            // Overloads only: same fqn with a different signature hash.
            let duplicate = entry.iter().any(|existing| {
                existing.node_id == symbol.node_id
                    && existing.signature_hash == symbol.signature_hash
            });
            if !duplicate {
                entry.push(Arc::clone(&symbol));
            }
            drop(entry);

            file_fqns.push(node.fqn.clone());
            self.name_to_fqns
                .entry(name)
                .or_default()
                .push(node.fqn.clone());
        }

        if !file_fqns.is_empty() {
            self.file_symbols.insert(file.file_path.clone(), file_fqns);
        }
    }

    /// Remove a file's symbols (incremental updates). Returns removed fqns.
    pub fn remove_file(&self, file_path: &str) -> Vec<String> {
        if let Some((_, fqns)) = self.file_symbols.remove(file_path) {
            for fqn in &fqns {
                if let Some(mut entry) = self.symbols.get_mut(fqn) {
                    entry.retain(|s| s.file_path != file_path);
                    if entry.is_empty() {
                        drop(entry);
                        self.symbols.remove(fqn);
                    }
                }
            }
            self.alias_to_fqn.retain(|k, _| k.0 != file_path);
            fqns
        } else {
            Vec::new()
        }
    }

    /// First registered overload for an fqn
    pub fn get(&self, fqn: &str) -> Option<Arc<Symbol>> {
        self.symbols
            .get(fqn)
            .and_then(|v| v.first().map(Arc::clone))
    }

    /// All overloads registered under an fqn
    pub fn get_overloads(&self, fqn: &str) -> Vec<Arc<Symbol>> {
        self.symbols
            .get(fqn)
            .map(|v| v.iter().map(Arc::clone).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, fqn: &str) -> bool {
        self.symbols.contains_key(fqn)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn fqns_by_name(&self, name: &str) -> Vec<String> {
        self.name_to_fqns
            .get(name)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn file_symbols(&self, file_path: &str) -> Vec<Arc<Symbol>> {
        self.file_symbols
            .get(file_path)
            .map(|fqns| fqns.iter().filter_map(|fqn| self.get(fqn)).collect())
            .unwrap_or_default()
    }

    /// All symbols as a plain map (serialization and summaries)
    pub fn to_hashmap(&self) -> HashMap<String, Symbol> {
        self.symbols
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .first()
                    .map(|s| (entry.key().clone(), (**s).clone()))
            })
            .collect()
    }

    // ── Resolution ladder ───────────────────────────────────────────────

    pub fn resolve_exact(&self, fqn: &str) -> Option<Arc<Symbol>> {
        self.get(fqn)
    }

    /// Progressively shorter prefixes: a.b.C → a.b → a
    pub fn resolve_partial(&self, fqn: &str) -> Option<(Arc<Symbol>, String)> {
        let parts: Vec<&str> = fqn.split('.').collect();
        for i in (1..parts.len()).rev() {
            let partial = parts[..i].join(".");
            if let Some(symbol) = self.get(&partial) {
                return Some((symbol, partial));
            }
        }
        None
    }

    /// Common module path patterns for a bare module name
    pub fn resolve_by_module_path(&self, module_name: &str) -> Option<Arc<Symbol>> {
        let base = module_name.split('.').next().unwrap_or(module_name);
        let patterns = [
            format!("{}.py", base),
            format!("src/{}.py", base),
            format!("{}/__init__.py", base),
            format!("src/{}/__init__.py", base),
        ];
        for pattern in &patterns {
            if let Some(fqns) = self.file_symbols.get(pattern.as_str()) {
                if let Some(fqn) = fqns.first() {
                    if let Some(symbol) = self.get(fqn) {
                        return Some(symbol);
                    }
                }
            }
        }
        None
    }

    // ── Aliases ─────────────────────────────────────────────────────────

    pub fn register_alias(&self, file_path: String, alias: String, fqn: String) {
        self.alias_to_fqn.insert((file_path, alias), fqn);
    }

    pub fn resolve_alias(&self, file_path: &str, alias: &str) -> Option<String> {
        self.alias_to_fqn
            .get(&(file_path.to_string(), alias.to_string()))
            .map(|v| v.clone())
    }

    pub fn file_aliases(&self, file_path: &str) -> HashMap<String, String> {
        self.alias_to_fqn
            .iter()
            .filter(|entry| entry.key().0 == file_path)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{Node, Span};

    fn file_with(nodes: Vec<Node>) -> FileIr {
        let mut file = FileIr::new(
            nodes
                .first()
                .map(|n| n.file_path.clone())
                .unwrap_or_default(),
            "python",
            "m",
        );
        file.nodes = nodes;
        file
    }

    fn func(id: &str, fqn: &str, path: &str, name: &str) -> Node {
        Node::new(id, NodeKind::Function, fqn, path, Span::new(1, 0, 3, 0))
            .with_language("python")
            .with_name(name)
    }

    #[test]
    fn test_build_and_lookup() {
        let file = file_with(vec![
            func("python:a.py:a.f", "a.f", "a.py", "f"),
            func("python:a.py:a.g", "a.g", "a.py", "g"),
        ]);
        let table = SymbolTable::build(&[file]);
        assert_eq!(table.len(), 2);
        assert!(table.contains("a.f"));
        assert_eq!(table.get("a.f").unwrap().name, "f");
    }

    #[test]
    fn test_import_nodes_not_indexed() {
        let import =
            Node::new("imp1", NodeKind::Import, "numpy", "a.py", Span::zero()).with_name("np");
        let table = SymbolTable::build(&[file_with(vec![import])]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_partial_resolution() {
        let file = file_with(vec![func(
            "python:m.py:module.submodule",
            "module.submodule",
            "m.py",
            "submodule",
        )]);
        let table = SymbolTable::build(&[file]);
        let (symbol, matched) = table.resolve_partial("module.submodule.Class").unwrap();
        assert_eq!(matched, "module.submodule");
        assert_eq!(symbol.fqn, "module.submodule");
    }

    #[test]
    fn test_remove_file_clears_symbols_and_aliases() {
        let file = file_with(vec![func("python:a.py:a.f", "a.f", "a.py", "f")]);
        let table = SymbolTable::build(&[file]);
        table.register_alias("a.py".into(), "np".into(), "numpy".into());

        let removed = table.remove_file("a.py");
        assert_eq!(removed, vec!["a.f".to_string()]);
        assert!(table.is_empty());
        assert_eq!(table.resolve_alias("a.py", "np"), None);
    }

    #[test]
    fn test_rerun_produces_identical_table() {
        let files = vec![
            file_with(vec![func("python:a.py:a.f", "a.f", "a.py", "f")]),
            file_with(vec![func("python:b.py:b.g", "b.g", "b.py", "g")]),
        ];
        let first = SymbolTable::build(&files).to_hashmap();
        let second = SymbolTable::build(&files).to_hashmap();
        assert_eq!(first.len(), second.len());
        for (fqn, symbol) in &first {
            assert_eq!(second.get(fqn).map(|s| &s.node_id), Some(&symbol.node_id));
        }
    }

    #[test]
    fn test_alias_is_file_scoped() {
        let table = SymbolTable::new();
        table.register_alias("main.py".into(), "np".into(), "numpy".into());
        assert_eq!(table.resolve_alias("main.py", "np"), Some("numpy".into()));
        assert_eq!(table.resolve_alias("other.py", "np"), None);
    }
}
