//! IR builder
//!
//! Stateful accumulator used by the per-language generators: manages the
//! scope stack, mints stable node ids, and collects nodes, edges, types,
//! signatures, and diagnostics into a `FileIr`.

use std::collections::BTreeMap;

use crate::shared::models::{
    Diagnostic, Edge, EdgeKind, FileIr, Node, NodeKind, SignatureEntity, Span, TypeEntity,
    TypeFlavor, Visibility,
};
use crate::shared::utils::hashing::content_hash;
use crate::shared::utils::ids;
use crate::shared::utils::{ScopeKind, ScopeStack};

const PRIMITIVE_TYPES: &[&str] = &["int", "float", "str", "bool", "bytes", "None", "complex"];
const BUILTIN_TYPES: &[&str] = &["list", "dict", "set", "tuple", "frozenset", "object", "type"];

pub struct IrBuilder {
    file_path: String,
    language: String,
    module_path: String,

    pub scopes: ScopeStack,

    out: FileIr,
    edge_counter: usize,
    lambda_counter: usize,
}

impl IrBuilder {
    pub fn new(
        file_path: impl Into<String>,
        language: impl Into<String>,
        module_path: impl Into<String>,
    ) -> Self {
        let file_path = file_path.into();
        let language = language.into();
        let module_path = module_path.into();

        let mut builder = Self {
            file_path: file_path.clone(),
            language: language.clone(),
            module_path: module_path.clone(),
            scopes: ScopeStack::new(),
            out: FileIr::new(file_path, language, module_path.clone()),
            edge_counter: 0,
            lambda_counter: 0,
        };
        builder.scopes.push(ScopeKind::Module, module_path);
        builder
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn node_id(&self, fqn: &str) -> String {
        ids::node_id(&self.language, &self.file_path, fqn)
    }

    pub fn external_id(&self, raw: &str) -> String {
        ids::external_id(&self.language, raw)
    }

    fn next_edge_id(&mut self, kind: EdgeKind) -> String {
        self.edge_counter += 1;
        ids::edge_id(&self.file_path, kind.as_str(), self.edge_counter)
    }

    pub fn next_lambda_ordinal(&mut self) -> usize {
        self.lambda_counter += 1;
        self.lambda_counter
    }

    // ── Nodes ───────────────────────────────────────────────────────────

    pub fn push_node(&mut self, node: Node) {
        self.out.nodes.push(node);
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.out.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.out.nodes.iter().any(|n| n.id == id)
    }

    /// Create the File node (one per file, always present)
    pub fn create_file_node(
        &mut self,
        span: Span,
        is_test_file: bool,
        docstring: Option<String>,
    ) -> String {
        let id = self.node_id(&self.module_path);
        let mut node = Node::new(
            id.clone(),
            NodeKind::File,
            self.module_path.clone(),
            self.file_path.clone(),
            span,
        )
        .with_language(self.language.clone())
        .with_module_path(self.module_path.clone());
        node.is_test_file = Some(is_test_file);
        node.docstring = docstring;
        self.out.nodes.push(node);
        if let Some(frame) = self.scopes.current_mut() {
            frame.node_id = Some(id.clone());
        }
        id
    }

    /// Create a definition node under the current scope, with CONTAINS from
    /// the parent and registration in the scope's symbol table.
    pub fn create_definition(
        &mut self,
        kind: NodeKind,
        name: &str,
        span: Span,
        body_span: Option<Span>,
        source_text: &str,
    ) -> String {
        let fqn = self.scopes.fqn_with(name);
        let id = self.node_id(&fqn);
        let parent_id = self.scopes.parent_node_id();

        let mut node = Node::new(id.clone(), kind, fqn, self.file_path.clone(), span)
            .with_language(self.language.clone())
            .with_name(name.to_string())
            .with_module_path(self.module_path.clone())
            .with_content_hash(content_hash(source_text));
        node.body_span = body_span;
        node.parent_id = parent_id.clone();
        self.out.nodes.push(node);

        if let Some(parent) = parent_id {
            self.add_edge(EdgeKind::Contains, &parent, &id, Some(span));
        }
        self.scopes.define(name, id.clone());
        id
    }

    /// Synthesize an external node (idempotent per raw reference)
    pub fn ensure_external(&mut self, kind: NodeKind, raw_reference: &str) -> String {
        let id = self.external_id(raw_reference);
        if !self.has_node(&id) {
            let node = Node::new(
                id.clone(),
                kind,
                raw_reference.to_string(),
                self.file_path.clone(),
                Span::zero(),
            )
            .with_language(self.language.clone())
            .with_name(
                raw_reference
                    .rsplit('.')
                    .next()
                    .unwrap_or(raw_reference)
                    .to_string(),
            );
            self.out.nodes.push(node);
        }
        id
    }

    // ── Edges ───────────────────────────────────────────────────────────

    pub fn add_edge(
        &mut self,
        kind: EdgeKind,
        source_id: &str,
        target_id: &str,
        span: Option<Span>,
    ) -> String {
        let id = self.next_edge_id(kind);
        let mut edge = Edge::new(id.clone(), kind, source_id, target_id);
        edge.span = span;
        self.out.edges.push(edge);
        id
    }

    pub fn add_edge_with_attrs(
        &mut self,
        kind: EdgeKind,
        source_id: &str,
        target_id: &str,
        span: Option<Span>,
        attrs: BTreeMap<String, serde_json::Value>,
    ) -> String {
        let id = self.next_edge_id(kind);
        let mut edge = Edge::new(id.clone(), kind, source_id, target_id);
        edge.span = span;
        edge.attrs = Some(attrs);
        self.out.edges.push(edge);
        id
    }

    // ── Types and signatures ────────────────────────────────────────────

    /// Resolve a type annotation into a TypeEntity, creating it on first
    /// sight. Returns the entity id.
    pub fn resolve_type(&mut self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let id = format!("{}:type:{}", self.language, raw);
        if self.out.types.iter().any(|t| t.id == id) {
            return Some(id);
        }

        let entity = self.build_type_entity(id.clone(), raw);
        self.out.types.push(entity);
        Some(id)
    }

    fn build_type_entity(&mut self, id: String, raw: &str) -> TypeEntity {
        // Optional[X] and X | None mark nullability
        if let Some(inner) = raw
            .strip_prefix("Optional[")
            .and_then(|s| s.strip_suffix(']'))
        {
            let inner_id = self.resolve_type(inner);
            return TypeEntity::new(id, raw, TypeFlavor::Generic)
                .nullable()
                .with_generic_params(inner_id.into_iter().collect());
        }
        if raw.contains('|') {
            let parts: Vec<&str> = raw.split('|').map(str::trim).collect();
            let nullable = parts.iter().any(|p| *p == "None");
            let param_ids: Vec<String> = parts
                .iter()
                .filter(|p| **p != "None")
                .filter_map(|p| self.resolve_type(p))
                .collect();
            let mut entity = TypeEntity::new(id, raw, TypeFlavor::Generic).with_generic_params(param_ids);
            if nullable {
                entity = entity.nullable();
            }
            return entity;
        }
        // Foo[A, B]
        if let Some(open) = raw.find('[') {
            if raw.ends_with(']') {
                let params = &raw[open + 1..raw.len() - 1];
                let param_ids: Vec<String> = split_generic_params(params)
                    .into_iter()
                    .filter_map(|p| self.resolve_type(&p))
                    .collect();
                return TypeEntity::new(id, raw, TypeFlavor::Generic).with_generic_params(param_ids);
            }
        }

        if PRIMITIVE_TYPES.contains(&raw) {
            return TypeEntity::new(id, raw, TypeFlavor::Primitive);
        }
        if BUILTIN_TYPES.contains(&raw) {
            return TypeEntity::new(id, raw, TypeFlavor::Builtin);
        }
        // Single-letter capitals are conventionally type variables
        if raw.len() <= 2 && raw.chars().next().map(char::is_uppercase).unwrap_or(false) {
            return TypeEntity::new(id, raw, TypeFlavor::Typevar);
        }
        // Locally defined class?
        if let Some(node_id) = self.scopes.resolve(raw) {
            return TypeEntity::new(id, raw, TypeFlavor::User).with_target(node_id.to_string());
        }
        TypeEntity::new(id, raw, TypeFlavor::External)
    }

    /// Attach a signature to a function/method node
    #[allow(clippy::too_many_arguments)]
    pub fn attach_signature(
        &mut self,
        owner_node_id: &str,
        name: &str,
        raw: &str,
        parameter_type_ids: Vec<String>,
        return_type_id: Option<String>,
        is_async: bool,
        is_static: bool,
    ) -> String {
        let sig_id = format!("sig:{}", owner_node_id);
        let signature = SignatureEntity::new(
            sig_id.clone(),
            owner_node_id.to_string(),
            name,
            raw,
            parameter_type_ids,
            return_type_id,
            Visibility::from_python_name(name),
            is_async,
            is_static,
        );
        self.out.signatures.push(signature);
        if let Some(node) = self.node_mut(owner_node_id) {
            node.signature_id = Some(sig_id.clone());
        }
        sig_id
    }

    /// Resolved target of an already-registered type entity, if any
    pub fn type_target(&self, type_id: &str) -> Option<&str> {
        self.out
            .types
            .iter()
            .find(|t| t.id == type_id)
            .and_then(|t| t.resolved_target.as_deref())
    }

    // ── Diagnostics and output ──────────────────────────────────────────

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.out.diagnostics.push(diagnostic);
    }

    pub fn push_cfg(&mut self, cfg: crate::shared::models::ControlFlowGraph) {
        self.out.control_flow_graphs.push(cfg);
    }

    pub fn finish(self) -> FileIr {
        self.out
    }
}

/// Split "A, dict[str, B]" into top-level comma-separated parts
fn split_generic_params(params: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in params.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> IrBuilder {
        IrBuilder::new("src/app.py", "python", "app")
    }

    #[test]
    fn test_definition_creates_contains_edge() {
        let mut b = builder();
        let file_id = b.create_file_node(Span::new(1, 0, 10, 0), false, None);
        let fn_id = b.create_definition(
            NodeKind::Function,
            "run",
            Span::new(2, 0, 4, 0),
            None,
            "def run(): pass",
        );
        assert_eq!(fn_id, "python:src/app.py:app.run");

        let ir = b.finish();
        assert!(ir
            .edges
            .iter()
            .any(|e| e.kind == EdgeKind::Contains
                && e.source_id == file_id
                && e.target_id == fn_id));
    }

    #[test]
    fn test_external_is_idempotent() {
        let mut b = builder();
        let a = b.ensure_external(NodeKind::ExternalFunction, "requests.get");
        let c = b.ensure_external(NodeKind::ExternalFunction, "requests.get");
        assert_eq!(a, c);
        assert_eq!(b.finish().nodes.len(), 1);
    }

    #[test]
    fn test_resolve_type_flavors() {
        let mut b = builder();
        b.resolve_type("int");
        b.resolve_type("list");
        b.resolve_type("Optional[str]");
        let ir = b.finish();

        let by_raw = |raw: &str| ir.types.iter().find(|t| t.raw == raw).unwrap();
        assert_eq!(by_raw("int").flavor, TypeFlavor::Primitive);
        assert_eq!(by_raw("list").flavor, TypeFlavor::Builtin);
        let opt = by_raw("Optional[str]");
        assert!(opt.is_nullable);
        assert_eq!(opt.generic_param_ids.len(), 1);
    }

    #[test]
    fn test_union_none_is_nullable() {
        let mut b = builder();
        b.resolve_type("int | None");
        let ir = b.finish();
        let t = ir.types.iter().find(|t| t.raw == "int | None").unwrap();
        assert!(t.is_nullable);
    }

    #[test]
    fn test_split_generic_params_nested() {
        assert_eq!(
            split_generic_params("str, dict[str, int]"),
            vec!["str".to_string(), "dict[str, int]".to_string()]
        );
    }

    #[test]
    fn test_signature_attaches_to_node() {
        let mut b = builder();
        b.create_file_node(Span::zero(), false, None);
        let fn_id =
            b.create_definition(NodeKind::Function, "f", Span::zero(), None, "def f(): ...");
        b.attach_signature(&fn_id, "f", "def f(x: int) -> str", vec![], None, false, false);
        let ir = b.finish();
        let node = ir.nodes.iter().find(|n| n.id == fn_id).unwrap();
        let expected = format!("sig:{}", fn_id);
        assert_eq!(node.signature_id.as_deref(), Some(expected.as_str()));
        assert_eq!(ir.signature_for(&fn_id).unwrap().owner_node_id, fn_id);
    }
}
