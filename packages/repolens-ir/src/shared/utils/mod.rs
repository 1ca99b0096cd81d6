//! Shared utilities

pub mod hashing;
pub mod ids;
pub mod scope_stack;

pub use hashing::{content_hash, file_hash, normalize_span_text};
pub use scope_stack::{ScopeFrame, ScopeKind, ScopeStack};
