//! Cross-file resolution types

use serde::{Deserialize, Serialize};

use crate::shared::models::{NodeKind, Span, Visibility};

/// Global symbol definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub fqn: String,
    pub name: String,
    pub kind: NodeKind,
    pub file_path: String,
    pub node_id: String,
    pub span: Span,
    pub visibility: Visibility,
    /// Distinguishes overloads sharing an fqn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_hash: Option<String>,
}

impl Symbol {
    pub fn new(
        fqn: String,
        name: String,
        kind: NodeKind,
        file_path: String,
        node_id: String,
        span: Span,
    ) -> Self {
        Self {
            fqn,
            name,
            kind,
            file_path,
            node_id,
            span,
            visibility: Visibility::Public,
            signature_hash: None,
        }
    }

    pub fn with_signature_hash(mut self, hash: String) -> Self {
        self.signature_hash = Some(hash);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

/// Method used to resolve an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionMethod {
    /// Exact fqn match
    ExactMatch,
    /// Partial prefix match (module.submodule.Class → module.submodule)
    PartialMatch,
    /// Module path pattern match (module → src/module.py)
    ModulePath,
    /// Relative import resolved against the importing file's module path
    Relative,
    /// Not found / external
    NotFound,
}

/// Resolved import information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedImport {
    /// What was imported, as written (canonicalized fqn)
    pub import_fqn: String,
    /// Actual symbol fqn when found
    pub resolved_fqn: Option<String>,
    /// File containing the definition
    pub source_file: Option<String>,
    /// Node id of the resolved symbol
    pub resolved_node_id: Option<String>,
    pub is_external: bool,
    pub alias: Option<String>,
    pub resolution_method: ResolutionMethod,
}

impl ResolvedImport {
    pub fn resolved(
        import_fqn: String,
        resolved_fqn: String,
        source_file: String,
        resolved_node_id: String,
        method: ResolutionMethod,
    ) -> Self {
        Self {
            import_fqn,
            resolved_fqn: Some(resolved_fqn),
            source_file: Some(source_file),
            resolved_node_id: Some(resolved_node_id),
            is_external: false,
            alias: None,
            resolution_method: method,
        }
    }

    pub fn unresolved(import_fqn: String) -> Self {
        Self {
            import_fqn,
            resolved_fqn: None,
            source_file: None,
            resolved_node_id: None,
            is_external: true,
            alias: None,
            resolution_method: ResolutionMethod::NotFound,
        }
    }

    pub fn with_alias(mut self, alias: String) -> Self {
        self.alias = Some(alias);
        self
    }
}

/// Import statement extracted from a file's IR
#[derive(Debug, Clone)]
pub struct ImportInfo {
    pub file_path: String,
    pub edge_id: String,
    pub source_node_id: String,
    pub imported_name: String,
    pub alias: Option<String>,
}

/// Statistics for one resolution run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub symbols_collected: usize,
    pub imports_resolved: usize,
    pub imports_unresolved: usize,
    pub dependencies_found: usize,
    pub cycles_detected: usize,
    pub duration_ms: u64,
}
