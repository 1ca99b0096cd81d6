//! Tree-sitter parser adapter
//!
//! This is where the tree-sitter dependency lives. Full parses convert the
//! grammar tree into the domain `SyntaxNode` model; incremental parses
//! reuse the previous tree via `Tree::edit` and fall back to a full parse
//! whenever the edit list cannot be trusted.

use parking_lot::Mutex;
use std::collections::HashMap;
use tree_sitter::{InputEdit, Parser as TsParser, Point, Tree, TreeCursor};

use super::domain::{ParseError, ParsedTree, SourceEdit, SyntaxKind, SyntaxNode};
use super::ports::SourceParser;
use crate::shared::models::{IrError, Result, Span};

/// Supported tree-sitter grammars
#[derive(Debug, Clone, Copy)]
pub enum TreeSitterLanguage {
    Python,
}

/// Tree-sitter based parser with incremental support
pub struct TreeSitterParser {
    language: TreeSitterLanguage,
    /// file_path → (previous tree, previous source) for incremental parsing
    previous: Mutex<HashMap<String, (Tree, String)>>,
}

impl TreeSitterParser {
    pub fn python() -> Self {
        Self {
            language: TreeSitterLanguage::Python,
            previous: Mutex::new(HashMap::new()),
        }
    }

    fn ts_language(&self) -> tree_sitter::Language {
        match self.language {
            TreeSitterLanguage::Python => tree_sitter_python::language(),
        }
    }

    fn new_ts_parser(&self) -> Result<TsParser> {
        let mut parser = TsParser::new();
        parser
            .set_language(&self.ts_language())
            .map_err(|e| IrError::parse(format!("failed to set language: {}", e)))?;
        Ok(parser)
    }

    fn parse_with(&self, source: &str, file_path: &str, old_tree: Option<&Tree>) -> Result<Tree> {
        let mut parser = self.new_ts_parser()?;
        parser
            .parse(source, old_tree)
            .ok_or_else(|| IrError::parse("parser returned no tree").with_file(file_path))
    }

    fn finish(&self, tree: Tree, source: &str, file_path: &str) -> ParsedTree {
        let mut cursor = tree.walk();
        let root = self.convert(&mut cursor, source);

        let mut errors = Vec::new();
        collect_errors(&tree.root_node(), &mut errors);

        self.previous
            .lock()
            .insert(file_path.to_string(), (tree.clone(), source.to_string()));

        ParsedTree::new(
            root,
            source.to_string(),
            file_path.to_string(),
            self.language_name().to_string(),
        )
        .with_errors(errors)
    }

    /// Convert the node under the cursor, recursing into named children and
    /// capturing grammar field names.
    fn convert(&self, cursor: &mut TreeCursor, source: &str) -> SyntaxNode {
        let node = cursor.node();
        let field = cursor.field_name().map(str::to_string);
        let span = span_of(&node);

        let mut children = Vec::new();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                // Comments and other extras do not shape the IR.
                if !child.is_extra() {
                    children.push(self.convert(cursor, source));
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }

        SyntaxNode {
            kind: map_node_kind(node.kind()),
            raw_kind: node.kind().to_string(),
            field,
            span,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            is_error: node.is_error() || node.is_missing(),
            children,
        }
    }

    /// An edit list is usable only if it is internally consistent with the
    /// cached previous source and lands exactly on the new source length.
    fn edits_consistent(edits: &[SourceEdit], old_len: usize, new_len: usize) -> bool {
        if edits.is_empty() {
            return false;
        }
        let mut len = old_len as i64;
        for edit in edits {
            if edit.byte_start > edit.old_byte_end || edit.byte_start > edit.new_byte_end {
                return false;
            }
            if (edit.old_byte_end as i64) > len {
                return false;
            }
            len += edit.new_byte_end as i64 - edit.old_byte_end as i64;
            if len < 0 {
                return false;
            }
        }
        len == new_len as i64
    }
}

impl SourceParser for TreeSitterParser {
    fn parse(&self, source: &str, file_path: &str) -> Result<ParsedTree> {
        let tree = self.parse_with(source, file_path, None)?;
        Ok(self.finish(tree, source, file_path))
    }

    fn parse_incremental(
        &self,
        source: &str,
        file_path: &str,
        edits: &[SourceEdit],
    ) -> Result<ParsedTree> {
        let prev = self.previous.lock().get(file_path).cloned();

        let (mut old_tree, old_source) = match prev {
            Some(entry) => entry,
            None => {
                tracing::debug!(file = file_path, "no previous tree, full parse");
                return self.parse(source, file_path);
            }
        };

        if !Self::edits_consistent(edits, old_source.len(), source.len()) {
            // Incremental parsing is never allowed to diverge from the
            // source; an untrusted edit list means a full parse.
            tracing::warn!(file = file_path, "inconsistent edit list, full parse");
            return self.parse(source, file_path);
        }

        for edit in edits {
            old_tree.edit(&to_input_edit(edit));
        }

        let tree = self.parse_with(source, file_path, Some(&old_tree))?;
        Ok(self.finish(tree, source, file_path))
    }

    fn supports_extension(&self, ext: &str) -> bool {
        match self.language {
            TreeSitterLanguage::Python => matches!(ext, "py" | "pyi"),
        }
    }

    fn language_name(&self) -> &'static str {
        match self.language {
            TreeSitterLanguage::Python => "python",
        }
    }
}

fn span_of(node: &tree_sitter::Node) -> Span {
    Span::new(
        node.start_position().row as u32 + 1,
        node.start_position().column as u32,
        node.end_position().row as u32 + 1,
        node.end_position().column as u32,
    )
}

fn to_input_edit(edit: &SourceEdit) -> InputEdit {
    InputEdit {
        start_byte: edit.byte_start,
        old_end_byte: edit.old_byte_end,
        new_end_byte: edit.new_byte_end,
        start_position: Point::new(edit.start_position.row, edit.start_position.column),
        old_end_position: Point::new(edit.old_end_position.row, edit.old_end_position.column),
        new_end_position: Point::new(edit.new_end_position.row, edit.new_end_position.column),
    }
}

fn collect_errors(node: &tree_sitter::Node, errors: &mut Vec<ParseError>) {
    if node.is_error() || node.is_missing() {
        errors.push(ParseError {
            message: format!("syntax error at {:?}", node.kind()),
            span: span_of(node),
        });
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            collect_errors(&child, errors);
        }
    }
}

/// Map tree-sitter grammar kinds to the language-neutral SyntaxKind
fn map_node_kind(ts_kind: &str) -> SyntaxKind {
    match ts_kind {
        "function_definition" => SyntaxKind::FunctionDef,
        "class_definition" => SyntaxKind::ClassDef,
        "lambda" => SyntaxKind::LambdaDef,

        "assignment" => SyntaxKind::AssignmentStmt,
        "augmented_assignment" => SyntaxKind::AugAssignmentStmt,
        "parameter" | "default_parameter" | "typed_parameter" | "typed_default_parameter" => {
            SyntaxKind::ParameterDecl
        }
        "import_statement" | "import_from_statement" => SyntaxKind::ImportDecl,

        "call" => SyntaxKind::CallExpr,
        "identifier" => SyntaxKind::NameExpr,
        "attribute" => SyntaxKind::AttributeExpr,
        "string" | "integer" | "float" | "true" | "false" | "none" => SyntaxKind::LiteralExpr,
        "binary_operator" | "comparison_operator" | "boolean_operator" => SyntaxKind::BinaryExpr,
        "unary_operator" | "not_operator" => SyntaxKind::UnaryExpr,

        "expression_statement" => SyntaxKind::ExpressionStmt,
        "return_statement" => SyntaxKind::ReturnStmt,
        "if_statement" => SyntaxKind::IfStmt,
        "for_statement" => SyntaxKind::ForStmt,
        "while_statement" => SyntaxKind::WhileStmt,
        "try_statement" => SyntaxKind::TryStmt,
        "with_statement" => SyntaxKind::WithStmt,
        "break_statement" => SyntaxKind::BreakStmt,
        "continue_statement" => SyntaxKind::ContinueStmt,
        "raise_statement" => SyntaxKind::RaiseStmt,
        "yield" => SyntaxKind::YieldExpr,
        "await" => SyntaxKind::AwaitExpr,

        "block" | "module" => SyntaxKind::Block,
        "comment" => SyntaxKind::Comment,
        "decorator" => SyntaxKind::Decorator,
        "type" => SyntaxKind::TypeAnnotation,
        "ERROR" => SyntaxKind::Error,

        other => SyntaxKind::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::domain::EditPosition;

    #[test]
    fn test_parse_python_function() {
        let parser = TreeSitterParser::python();
        let tree = parser.parse("def hello():\n    pass\n", "test.py").unwrap();
        assert!(!tree.has_errors);
        assert!(tree
            .root
            .walk()
            .any(|n| n.kind == SyntaxKind::FunctionDef));
    }

    #[test]
    fn test_parse_error_still_returns_tree() {
        let parser = TreeSitterParser::python();
        let tree = parser.parse("def broken(:\n", "bad.py").unwrap();
        assert!(tree.has_errors);
        assert!(!tree.errors.is_empty());
    }

    #[test]
    fn test_incremental_matches_full_parse() {
        let parser = TreeSitterParser::python();
        let v1 = "def hello():\n    return 1\n";
        let v2 = "def hello():\n    return 2\n";
        parser.parse(v1, "inc.py").unwrap();

        // Replace "1" with "2" (byte 24)
        let edit = SourceEdit {
            byte_start: 24,
            old_byte_end: 25,
            new_byte_end: 25,
            start_position: EditPosition { row: 1, column: 11 },
            old_end_position: EditPosition { row: 1, column: 12 },
            new_end_position: EditPosition { row: 1, column: 12 },
        };
        let incremental = parser.parse_incremental(v2, "inc.py", &[edit]).unwrap();

        let fresh = TreeSitterParser::python();
        let full = fresh.parse(v2, "inc.py").unwrap();
        assert_eq!(incremental.root, full.root);
    }

    #[test]
    fn test_inconsistent_edits_fall_back_to_full() {
        let parser = TreeSitterParser::python();
        let v1 = "x = 1\n";
        let v2 = "x = 2\n";
        parser.parse(v1, "fb.py").unwrap();

        // old_byte_end beyond previous source; must be rejected
        let edit = SourceEdit {
            byte_start: 0,
            old_byte_end: 999,
            new_byte_end: 1,
            start_position: EditPosition { row: 0, column: 0 },
            old_end_position: EditPosition { row: 0, column: 1 },
            new_end_position: EditPosition { row: 0, column: 1 },
        };
        let tree = parser.parse_incremental(v2, "fb.py", &[edit]).unwrap();
        assert!(!tree.has_errors);
        assert_eq!(tree.source, v2);
    }

    #[test]
    fn test_missing_previous_tree_falls_back() {
        let parser = TreeSitterParser::python();
        let tree = parser.parse_incremental("x = 1\n", "never_seen.py", &[]).unwrap();
        assert!(!tree.has_errors);
    }

    #[test]
    fn test_supports_extension() {
        let parser = TreeSitterParser::python();
        assert!(parser.supports_extension("py"));
        assert!(parser.supports_extension("pyi"));
        assert!(!parser.supports_extension("rs"));
    }
}
