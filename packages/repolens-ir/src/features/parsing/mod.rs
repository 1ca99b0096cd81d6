//! Parsing feature: source file → syntax tree
//!
//! Full and incremental (edit-driven) parsing behind the `SourceParser`
//! port. The rest of the core only sees the domain tree.

pub mod domain;
pub mod ports;
mod tree_sitter;

pub use domain::{EditPosition, ParseError, ParsedTree, SourceEdit, SyntaxKind, SyntaxNode};
pub use ports::SourceParser;
pub use tree_sitter::{TreeSitterLanguage, TreeSitterParser};
