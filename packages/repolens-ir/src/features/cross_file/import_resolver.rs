//! Import resolver
//!
//! Resolves IMPORTS edges against the global symbol table, in parallel per
//! file. Edge targets arrive in two forms: intermediate Import node ids or
//! raw fqns. Both are accepted — node id first, then fqn — and rewritten
//! to canonical node ids; anything unresolved points at a synthesized
//! ExternalSymbol node.

use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::HashMap;

use super::symbol_table::SymbolTable;
use super::types::{ImportInfo, ResolutionMethod, ResolvedImport};
use crate::shared::models::{EdgeKind, FileIr, Node, NodeKind, Span};
use crate::shared::utils::ids;

pub struct ImportResolver<'a> {
    table: &'a SymbolTable,
}

impl<'a> ImportResolver<'a> {
    pub fn new(table: &'a SymbolTable) -> Self {
        Self { table }
    }

    /// Resolve all imports from per-file IR (parallel).
    /// Returns file_path → resolved imports.
    pub fn resolve_all(&self, files: &[FileIr]) -> HashMap<String, Vec<ResolvedImport>> {
        let grouped: DashMap<String, Vec<ImportInfo>> = DashMap::new();
        files
            .par_iter()
            .flat_map_iter(|file| collect_imports(file))
            .for_each(|info| {
                grouped.entry(info.file_path.clone()).or_default().push(info);
            });

        grouped
            .into_iter()
            .par_bridge()
            .map(|(file_path, imports)| {
                let resolved = imports
                    .iter()
                    .map(|info| self.resolve_single(info))
                    .collect();
                (file_path, resolved)
            })
            .collect()
    }

    /// Resolution ladder: exact fqn → partial prefix → module path pattern
    /// → relative import → external.
    fn resolve_single(&self, import: &ImportInfo) -> ResolvedImport {
        let fqn = &import.imported_name;

        let mut resolved = if let Some(symbol) = self.table.resolve_exact(fqn) {
            ResolvedImport::resolved(
                fqn.clone(),
                symbol.fqn.clone(),
                symbol.file_path.clone(),
                symbol.node_id.clone(),
                ResolutionMethod::ExactMatch,
            )
        } else if let Some((symbol, matched)) = self.table.resolve_partial(fqn) {
            ResolvedImport::resolved(
                fqn.clone(),
                matched,
                symbol.file_path.clone(),
                symbol.node_id.clone(),
                ResolutionMethod::PartialMatch,
            )
        } else if let Some(symbol) = self.table.resolve_by_module_path(fqn) {
            ResolvedImport::resolved(
                fqn.clone(),
                symbol.fqn.clone(),
                symbol.file_path.clone(),
                symbol.node_id.clone(),
                ResolutionMethod::ModulePath,
            )
        } else if let Some(hit) = self.resolve_relative(import) {
            hit
        } else {
            tracing::debug!(import = %fqn, file = %import.file_path, "unresolved import");
            ResolvedImport::unresolved(fqn.clone())
        };

        // Aliases are registered even for unresolved externals
        // (`import numpy as np` must still resolve `np.array`).
        if let Some(alias) = &import.alias {
            let canonical = resolved.resolved_fqn.clone().unwrap_or_else(|| fqn.clone());
            self.table
                .register_alias(import.file_path.clone(), alias.clone(), canonical);
            resolved = resolved.with_alias(alias.clone());
        }

        resolved
    }

    /// `.utils` imported from `pkg/main.py` resolves against `pkg`
    fn resolve_relative(&self, import: &ImportInfo) -> Option<ResolvedImport> {
        let fqn = &import.imported_name;
        if !fqn.starts_with('.') {
            return None;
        }
        let dots = fqn.chars().take_while(|c| *c == '.').count();
        let remainder = &fqn[dots..];

        let module_parts: Vec<&str> = import
            .file_path
            .trim_end_matches(".py")
            .split('/')
            .filter(|s| !s.is_empty() && *s != "src")
            .collect();
        if module_parts.len() < dots {
            return None;
        }

        let base = &module_parts[..module_parts.len() - dots + 1];
        let absolute = if remainder.is_empty() {
            base.join(".")
        } else if base.is_empty() {
            remainder.to_string()
        } else {
            format!("{}.{}", base.join("."), remainder)
        };

        if let Some(symbol) = self.table.resolve_exact(&absolute) {
            return Some(ResolvedImport::resolved(
                fqn.clone(),
                absolute,
                symbol.file_path.clone(),
                symbol.node_id.clone(),
                ResolutionMethod::Relative,
            ));
        }
        if let Some((symbol, matched)) = self.table.resolve_partial(&absolute) {
            return Some(ResolvedImport::resolved(
                fqn.clone(),
                matched,
                symbol.file_path.clone(),
                symbol.node_id.clone(),
                ResolutionMethod::Relative,
            ));
        }
        None
    }
}

/// Extract imports from one file's IR. The edge target may be an Import
/// node id or a raw fqn; both forms are accepted (node id lookup first,
/// then fqn), otherwise import counts silently collapse to zero.
pub fn collect_imports(file: &FileIr) -> Vec<ImportInfo> {
    let node_by_id: HashMap<&str, &Node> =
        file.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let mut imports = Vec::new();
    for edge in &file.edges {
        if edge.kind != EdgeKind::Imports {
            continue;
        }

        let imported_name = match node_by_id.get(edge.target_id.as_str()) {
            // Node-id form: the fqn lives on the Import node
            Some(target) if !target.fqn.is_empty() => target.fqn.clone(),
            Some(target) => target.display_name().to_string(),
            // Raw-fqn form: the target id is the fqn itself
            None if !edge.target_id.is_empty() => edge.target_id.clone(),
            None => continue,
        };
        if imported_name.is_empty() {
            continue;
        }

        imports.push(ImportInfo {
            file_path: file.file_path.clone(),
            edge_id: edge.id.clone(),
            source_node_id: edge.source_id.clone(),
            imported_name,
            alias: edge.alias().map(str::to_string),
        });
    }
    imports
}

/// Rewrite reference-bearing edges whose target is a raw fqn to the
/// canonical node id; unresolved targets get an ExternalSymbol node
/// synthesized in the owning file.
pub fn rewrite_edge_targets(files: &mut [FileIr], table: &SymbolTable) {
    const REWRITABLE: &[EdgeKind] = &[
        EdgeKind::Imports,
        EdgeKind::Calls,
        EdgeKind::Inherits,
        EdgeKind::Implements,
        EdgeKind::Instantiates,
        EdgeKind::Throws,
        EdgeKind::Uses,
        EdgeKind::Decorates,
        EdgeKind::References,
    ];

    files.par_iter_mut().for_each(|file| {
        let local_ids: std::collections::HashSet<String> =
            file.nodes.iter().map(|n| n.id.clone()).collect();
        let language = file.language.clone();
        let mut externals: Vec<Node> = Vec::new();

        for edge in &mut file.edges {
            if !REWRITABLE.contains(&edge.kind) {
                continue;
            }
            // Node ids always carry a `:`; raw fqns never do. Skipping on
            // `:` keeps the rewrite idempotent across repeated runs.
            if edge.target_id.contains(':') || local_ids.contains(&edge.target_id) {
                continue;
            }
            // Raw fqn → canonical node id via the global table
            if let Some(symbol) = table.get(&edge.target_id) {
                edge.target_id = symbol.node_id.clone();
                continue;
            }
            // Source edges emitted against decorator/base symbols may have
            // fqn sources too
            let external_id = ids::external_id(&language, &edge.target_id);
            if !local_ids.contains(&external_id)
                && !externals.iter().any(|n| n.id == external_id)
            {
                let kind = if edge.kind == EdgeKind::Calls {
                    NodeKind::ExternalFunction
                } else {
                    NodeKind::ExternalSymbol
                };
                externals.push(
                    Node::new(
                        external_id.clone(),
                        kind,
                        edge.target_id.clone(),
                        file.file_path.clone(),
                        Span::zero(),
                    )
                    .with_language(language.clone()),
                );
            }
            edge.target_id = external_id;
        }

        // Rewrite fqn-form edge sources (decorator symbols) the same way
        for edge in &mut file.edges {
            if !REWRITABLE.contains(&edge.kind) {
                continue;
            }
            if edge.source_id.contains(':') || local_ids.contains(&edge.source_id) {
                continue;
            }
            if let Some(symbol) = table.get(&edge.source_id) {
                edge.source_id = symbol.node_id.clone();
            } else {
                let external_id = ids::external_id(&language, &edge.source_id);
                if !externals.iter().any(|n| n.id == external_id) {
                    externals.push(
                        Node::new(
                            external_id.clone(),
                            NodeKind::ExternalSymbol,
                            edge.source_id.clone(),
                            file.file_path.clone(),
                            Span::zero(),
                        )
                        .with_language(language.clone()),
                    );
                }
                edge.source_id = external_id;
            }
        }

        file.nodes.extend(externals);
    });
}
