//! Parsing domain model
//!
//! The syntax tree the rest of the core sees. Opaque from the core's
//! perspective except traversal primitives: visit children, get kind, get
//! text span. No tree-sitter types leak past the adapter.

use serde::{Deserialize, Serialize};

use crate::shared::models::Span;

/// Language-neutral syntax node kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyntaxKind {
    // Definitions
    FunctionDef,
    ClassDef,
    LambdaDef,

    // Declarations
    AssignmentStmt,
    AugAssignmentStmt,
    ParameterDecl,
    ImportDecl,

    // Expressions
    CallExpr,
    NameExpr,
    AttributeExpr,
    LiteralExpr,
    BinaryExpr,
    UnaryExpr,

    // Statements
    ExpressionStmt,
    ReturnStmt,
    IfStmt,
    ForStmt,
    WhileStmt,
    TryStmt,
    WithStmt,
    BreakStmt,
    ContinueStmt,
    RaiseStmt,
    YieldExpr,
    AwaitExpr,

    // Other
    Block,
    Comment,
    Decorator,
    TypeAnnotation,
    Error,
    Other(String),
}

/// A node in the converted syntax tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    /// Grammar-level kind string (e.g. "comparison_operator")
    pub raw_kind: String,
    /// Field name of this node within its parent, when the grammar names it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub span: Span,
    pub start_byte: usize,
    pub end_byte: usize,
    pub is_error: bool,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn child_by_field(&self, field: &str) -> Option<&SyntaxNode> {
        self.children
            .iter()
            .find(|c| c.field.as_deref() == Some(field))
    }

    pub fn children_of_kind<'a>(
        &'a self,
        kind: &'a SyntaxKind,
    ) -> impl Iterator<Item = &'a SyntaxNode> {
        self.children.iter().filter(move |c| &c.kind == kind)
    }

    pub fn first_of_kind(&self, kind: &SyntaxKind) -> Option<&SyntaxNode> {
        self.children.iter().find(|c| &c.kind == kind)
    }

    /// Depth-first pre-order walk. Restartable and non-mutating; early
    /// termination by dropping the iterator.
    pub fn walk(&self) -> SyntaxWalk<'_> {
        SyntaxWalk { stack: vec![self] }
    }
}

/// Pre-order DFS cursor over a syntax subtree
pub struct SyntaxWalk<'a> {
    stack: Vec<&'a SyntaxNode>,
}

impl<'a> Iterator for SyntaxWalk<'a> {
    type Item = &'a SyntaxNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

/// Syntax error recorded during parsing. The tree is still returned;
/// downstream components tolerate error nodes without aborting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

/// Parsed tree with its source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTree {
    pub root: SyntaxNode,
    pub source: String,
    pub file_path: String,
    pub language: String,
    pub has_errors: bool,
    pub errors: Vec<ParseError>,
}

impl ParsedTree {
    pub fn new(root: SyntaxNode, source: String, file_path: String, language: String) -> Self {
        Self {
            root,
            source,
            file_path,
            language,
            has_errors: false,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<ParseError>) -> Self {
        self.has_errors = !errors.is_empty();
        self.errors = errors;
        self
    }

    /// Source text of a node's byte range
    pub fn text_of(&self, node: &SyntaxNode) -> &str {
        self.source.get(node.start_byte..node.end_byte).unwrap_or("")
    }
}

/// Zero-based position used by the edit protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPosition {
    pub row: usize,
    pub column: usize,
}

/// One edit, in the incremental parsing protocol's coordinates. Edit lists
/// are applied in order; each edit is expressed against the text produced
/// by the previous edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEdit {
    pub byte_start: usize,
    pub old_byte_end: usize,
    pub new_byte_end: usize,
    pub start_position: EditPosition,
    pub old_end_position: EditPosition,
    pub new_end_position: EditPosition,
}
