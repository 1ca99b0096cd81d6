//! IR generator port and language registry
//!
//! Per-language generators share a capability-set contract and register in
//! a language-keyed table. Composition and a dispatch table, no
//! inheritance.

use std::collections::HashMap;
use std::sync::Arc;

use crate::features::parsing::ParsedTree;
use crate::shared::models::{FileIr, Result};

/// Per-language IR generator contract
///
/// `generate` never raises for malformed code: uninterpretable subtrees
/// are skipped with a diagnostic and the rest of the file is produced.
pub trait IrGenerator: Send + Sync {
    fn language(&self) -> &'static str;

    /// Produce the IR for one file. When `previous` is given and the
    /// generator supports incremental generation it may reuse unchanged
    /// subtrees; otherwise it regenerates fully.
    fn generate(&self, tree: &ParsedTree, previous: Option<&FileIr>) -> Result<FileIr>;

    fn supports_incremental(&self) -> bool {
        false
    }
}

/// Language-keyed generator table
#[derive(Default)]
pub struct GeneratorRegistry {
    generators: HashMap<&'static str, Arc<dyn IrGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with all built-in generators
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::python::PythonIrGenerator::new()));
        registry
    }

    pub fn register(&mut self, generator: Arc<dyn IrGenerator>) {
        self.generators.insert(generator.language(), generator);
    }

    pub fn get(&self, language: &str) -> Option<Arc<dyn IrGenerator>> {
        self.generators.get(language).cloned()
    }

    pub fn languages(&self) -> Vec<&'static str> {
        let mut langs: Vec<_> = self.generators.keys().copied().collect();
        langs.sort();
        langs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_dispatch() {
        let registry = GeneratorRegistry::with_defaults();
        assert!(registry.get("python").is_some());
        assert!(registry.get("cobol").is_none());
        assert_eq!(registry.languages(), vec!["python"]);
    }
}
