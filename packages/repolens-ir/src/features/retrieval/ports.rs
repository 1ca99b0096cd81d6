//! Search strategy port

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::shared::models::Result;

/// Retrieval strategy identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Vector,
    Lexical,
    Symbol,
    Graph,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Vector,
        Strategy::Lexical,
        Strategy::Symbol,
        Strategy::Graph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Vector => "vector",
            Strategy::Lexical => "lexical",
            Strategy::Symbol => "symbol",
            Strategy::Graph => "graph",
        }
    }
}

/// One ranked hit from a single strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    /// 0-indexed rank within the strategy's result list
    pub rank: usize,
    pub strategy: Strategy,
}

/// Document handed to an index adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocument {
    pub chunk_id: String,
    pub text: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqn: Option<String>,
}

/// Index adapter contract, one per retrieval strategy. Concrete back-ends
/// (full-text engine, vector store, graph database) live outside the core.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    fn strategy(&self) -> Strategy;

    async fn index(&self, documents: &[IndexDocument]) -> Result<()>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;

    async fn delete(&self, chunk_ids: &[String]) -> Result<()>;
}
