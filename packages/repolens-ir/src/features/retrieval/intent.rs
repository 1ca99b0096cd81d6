//! Rule-based query intent classification
//!
//! Rules are examined in priority order; the first match wins; the default
//! is code_search. An ML classifier can replace this behind the same
//! function signature.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    CodeSearch,
    SymbolNav,
    ConceptSearch,
    FlowTrace,
    RepoOverview,
}

static FLOW_TRACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(call(s|ers|ees)?|flow|trace|reach(es|able)?|path (from|to)|data.?flow)\b")
        .expect("static regex")
});

static REPO_OVERVIEW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(overview|architecture|structure|layout|entry.?points?|what does (this|the) (repo|project|codebase))\b")
        .expect("static regex")
});

/// Bare identifier: CamelCase, snake_case, or a dotted/colon path with no
/// spaces
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*([.:]{1,2}[A-Za-z_][A-Za-z0-9_]*)*$").expect("static regex")
});

static QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(how|why|what|where|when|which|explain)\b").expect("static regex"));

pub fn classify_intent(query: &str) -> QueryIntent {
    let query = query.trim();

    // Priority order; first match wins.
    if REPO_OVERVIEW.is_match(query) {
        return QueryIntent::RepoOverview;
    }
    if FLOW_TRACE.is_match(query) {
        return QueryIntent::FlowTrace;
    }
    if !query.contains(' ') && IDENTIFIER.is_match(query) {
        // A single identifier-shaped token is a symbol lookup
        let looks_symbolic = query.contains('_')
            || query.contains('.')
            || query.contains(':')
            || query.chars().any(|c| c.is_uppercase());
        if looks_symbolic {
            return QueryIntent::SymbolNav;
        }
    }
    if QUESTION.is_match(query) && query.split_whitespace().count() >= 4 {
        return QueryIntent::ConceptSearch;
    }

    QueryIntent::CodeSearch
}
