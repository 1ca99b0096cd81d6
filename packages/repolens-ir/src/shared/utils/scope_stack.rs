//! Scope stack for FQN building and in-scope name resolution
//!
//! Tracks nested scopes during AST traversal. Each frame carries the scope
//! kind, its name segment, a local symbol table (name → node id), and the
//! import alias map visible from that scope.

use std::collections::HashMap;

/// Scope kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    Block,
}

/// One scope frame
#[derive(Debug, Clone)]
pub struct ScopeFrame {
    pub kind: ScopeKind,
    pub name: String,
    /// Node id owning this scope (set once the node is created)
    pub node_id: Option<String>,
    /// name → node id for symbols defined in this scope
    pub symbols: HashMap<String, String>,
    /// local alias → canonical fqn for imports visible in this scope
    pub aliases: HashMap<String, String>,
}

impl ScopeFrame {
    fn new(kind: ScopeKind, name: String) -> Self {
        Self {
            kind,
            name,
            node_id: None,
            symbols: HashMap::new(),
            aliases: HashMap::new(),
        }
    }
}

/// Scope stack for managing fully qualified names and lexical resolution
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, kind: ScopeKind, name: impl Into<String>) {
        self.frames.push(ScopeFrame::new(kind, name.into()));
    }

    pub fn pop(&mut self) -> Option<ScopeFrame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current(&self) -> Option<&ScopeFrame> {
        self.frames.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut ScopeFrame> {
        self.frames.last_mut()
    }

    /// Node id of the innermost scope that has one (the enclosing parent)
    pub fn parent_node_id(&self) -> Option<String> {
        self.frames.iter().rev().find_map(|f| f.node_id.clone())
    }

    /// Current FQN prefix
    pub fn fqn(&self) -> String {
        self.frames
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// FQN with an additional trailing name
    pub fn fqn_with(&self, name: &str) -> String {
        if self.frames.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.fqn(), name)
        }
    }

    /// Register a symbol in the current scope
    pub fn define(&mut self, name: impl Into<String>, node_id: impl Into<String>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.symbols.insert(name.into(), node_id.into());
        }
    }

    /// Register an import alias in the current scope
    pub fn define_alias(&mut self, alias: impl Into<String>, canonical_fqn: impl Into<String>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.aliases.insert(alias.into(), canonical_fqn.into());
        }
    }

    /// Resolve a bare name against the stack, innermost scope first
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.symbols.get(name).map(String::as_str))
    }

    /// Resolve an import alias to its canonical fqn, innermost scope first
    pub fn resolve_alias(&self, alias: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.aliases.get(alias).map(String::as_str))
    }

    /// True when the innermost non-block scope is a class body
    pub fn in_class_body(&self) -> bool {
        self.frames
            .iter()
            .rev()
            .find(|f| f.kind != ScopeKind::Block)
            .map(|f| f.kind == ScopeKind::Class)
            .unwrap_or(false)
    }
}
