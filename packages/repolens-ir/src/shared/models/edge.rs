//! IR edge model
//!
//! Edges are first-class: a class's base list is INHERITS edges, a file's
//! imports are IMPORTS edges. Endpoints refer to nodes in the owning
//! document or to synthesized External* nodes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::span::Span;

/// Edge kind, partitioned into families (structure / call-use / reference /
/// type-module / control-resource)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    // Structure
    Contains,
    Defines,
    // Call / use
    Calls,
    Reads,
    Writes,
    // Reference
    References,
    // Type / module
    Imports,
    Inherits,
    Implements,
    Instantiates,
    Overrides,
    Decorates,
    // Control / resource
    Throws,
    Uses,
    ReadsResource,
    WritesResource,
    RouteTo,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::Defines => "DEFINES",
            EdgeKind::Calls => "CALLS",
            EdgeKind::Reads => "READS",
            EdgeKind::Writes => "WRITES",
            EdgeKind::References => "REFERENCES",
            EdgeKind::Imports => "IMPORTS",
            EdgeKind::Inherits => "INHERITS",
            EdgeKind::Implements => "IMPLEMENTS",
            EdgeKind::Instantiates => "INSTANTIATES",
            EdgeKind::Overrides => "OVERRIDES",
            EdgeKind::Decorates => "DECORATES",
            EdgeKind::Throws => "THROWS",
            EdgeKind::Uses => "USES",
            EdgeKind::ReadsResource => "READS_RESOURCE",
            EdgeKind::WritesResource => "WRITES_RESOURCE",
            EdgeKind::RouteTo => "ROUTE_TO",
        }
    }
}

/// IR edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub kind: EdgeKind,
    pub source_id: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    /// Open key/value map (import alias, constant call arguments, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<BTreeMap<String, serde_json::Value>>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        kind: EdgeKind,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            source_id: source_id.into(),
            target_id: target_id.into(),
            span: None,
            attrs: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
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

    /// Import alias, when this is an IMPORTS edge with one
    pub fn alias(&self) -> Option<&str> {
        self.attr("alias").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_kind_str() {
        assert_eq!(EdgeKind::Contains.as_str(), "CONTAINS");
        assert_eq!(EdgeKind::ReadsResource.as_str(), "READS_RESOURCE");
    }

    #[test]
    fn test_edge_alias_attr() {
        let edge = Edge::new("e1", EdgeKind::Imports, "a", "numpy")
            .with_attr("alias", serde_json::json!("np"));
        assert_eq!(edge.alias(), Some("np"));
    }
}
