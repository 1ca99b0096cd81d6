//! IR node model
//!
//! Nodes are the vertices of the language-neutral IR. Relational facts
//! (inheritance, imports, calls) are always expressed as edges, never as
//! node fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::span::Span;

/// Node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Module,
    Class,
    Interface,
    Function,
    Method,
    Lambda,
    Variable,
    Field,
    Import,
    Export,
    Block,
    Condition,
    Loop,
    TryCatch,
    /// Synthesized for a call whose callee could not be resolved
    ExternalFunction,
    /// Synthesized for a reference that could not be resolved
    ExternalSymbol,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "File",
            NodeKind::Module => "Module",
            NodeKind::Class => "Class",
            NodeKind::Interface => "Interface",
            NodeKind::Function => "Function",
            NodeKind::Method => "Method",
            NodeKind::Lambda => "Lambda",
            NodeKind::Variable => "Variable",
            NodeKind::Field => "Field",
            NodeKind::Import => "Import",
            NodeKind::Export => "Export",
            NodeKind::Block => "Block",
            NodeKind::Condition => "Condition",
            NodeKind::Loop => "Loop",
            NodeKind::TryCatch => "TryCatch",
            NodeKind::ExternalFunction => "ExternalFunction",
            NodeKind::ExternalSymbol => "ExternalSymbol",
        }
    }

    /// Kinds that represent callable definitions
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            NodeKind::Function | NodeKind::Method | NodeKind::Lambda
        )
    }

    /// Synthesized kinds that live outside the indexed source tree
    pub fn is_external(&self) -> bool {
        matches!(self, NodeKind::ExternalFunction | NodeKind::ExternalSymbol)
    }
}

/// IR node
///
/// `id` follows the stable scheme `<language>:<relative_path>:<fqn>` for
/// definitions and `<language>:external:<raw_reference>` for synthesized
/// externals. Ids never embed line numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub fqn: String,
    pub file_path: String,
    pub span: Span,
    pub language: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_span: Option<Span>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_path: Option<String>,
    /// Redundant with the CONTAINS edge from the parent; must agree with it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// SHA-256 of the node's span text, trailing whitespace stripped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_test_file: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_type_id: Option<String>,
    /// Open attribute map (cyclomatic complexity, exports, const args, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<BTreeMap<String, serde_json::Value>>,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        kind: NodeKind,
        fqn: impl Into<String>,
        file_path: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            fqn: fqn.into(),
            file_path: file_path.into(),
            span,
            language: String::new(),
            name: None,
            body_span: None,
            module_path: None,
            parent_id: None,
            content_hash: None,
            docstring: None,
            role: None,
            is_test_file: None,
            signature_id: None,
            declared_type_id: None,
            attrs: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_module_path(mut self, module_path: impl Into<String>) -> Self {
        self.module_path = Some(module_path.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_body_span(mut self, body_span: Span) -> Self {
        self.body_span = Some(body_span);
        self
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    pub fn with_signature(mut self, signature_id: impl Into<String>) -> Self {
        self.signature_id = Some(signature_id.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attrs
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&serde_json::Value> {
        self.attrs.as_ref().and_then(|a| a.get(key))
    }

    /// Short name; falls back to the last FQN component
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) => name.as_str(),
            None => self.fqn.rsplit('.').next().unwrap_or(&self.fqn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builder() {
        let node = Node::new(
            "python:src/app.py:app.main",
            NodeKind::Function,
            "app.main",
            "src/app.py",
            Span::new(1, 0, 5, 0),
        )
        .with_language("python")
        .with_name("main")
        .with_attr("complexity", serde_json::json!(3));

        assert_eq!(node.display_name(), "main");
        assert_eq!(node.attr("complexity"), Some(&serde_json::json!(3)));
        assert!(!node.kind.is_external());
    }

    #[test]
    fn test_display_name_falls_back_to_fqn() {
        let node = Node::new(
            "python:a.py:mod.Cls.method",
            NodeKind::Method,
            "mod.Cls.method",
            "a.py",
            Span::zero(),
        );
        assert_eq!(node.display_name(), "method");
    }

    #[test]
    fn test_unknown_fields_tolerated_on_deserialize() {
        let json = r#"{
            "id": "python:a.py:a.f",
            "kind": "Function",
            "fqn": "a.f",
            "file_path": "a.py",
            "span": {"start_line":1,"start_col":0,"end_line":2,"end_col":0},
            "language": "python",
            "some_future_field": {"x": 1}
        }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.fqn, "a.f");
    }
}
