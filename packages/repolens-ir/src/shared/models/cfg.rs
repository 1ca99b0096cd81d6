//! Control-flow graph types
//!
//! One CFG exists per function/method/lambda. These are shared types used
//! by flow construction, data-flow emission, and narrowing, so they live in
//! shared/models to avoid circular feature dependencies.

use serde::{Deserialize, Serialize};

use super::span::Span;

/// Basic block kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CfgBlockKind {
    Entry,
    Exit,
    Block,
    Condition,
    LoopHeader,
    Try,
    Catch,
    Finally,
}

/// Control-flow edge kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CfgEdgeKind {
    Normal,
    TrueBranch,
    FalseBranch,
    Exception,
    LoopBack,
}

impl CfgEdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CfgEdgeKind::Normal => "NORMAL",
            CfgEdgeKind::TrueBranch => "TRUE_BRANCH",
            CfgEdgeKind::FalseBranch => "FALSE_BRANCH",
            CfgEdgeKind::Exception => "EXCEPTION",
            CfgEdgeKind::LoopBack => "LOOP_BACK",
        }
    }
}

/// Basic block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfgBlock {
    pub id: String,
    pub kind: CfgBlockKind,
    pub span: Span,
    /// Variables assigned in this block (names during construction,
    /// rewritten to node ids by data-flow emission)
    #[serde(default)]
    pub defined_variable_ids: Vec<String>,
    /// Variables read in this block
    #[serde(default)]
    pub used_variable_ids: Vec<String>,
    /// Condition text for Condition/LoopHeader blocks (narrowing input)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_text: Option<String>,
}

impl CfgBlock {
    pub fn new(id: impl Into<String>, kind: CfgBlockKind, span: Span) -> Self {
        Self {
            id: id.into(),
            kind,
            span,
            defined_variable_ids: Vec::new(),
            used_variable_ids: Vec::new(),
            condition_text: None,
        }
    }
}

/// Control-flow edge between two blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfgEdge {
    pub source_block_id: String,
    pub target_block_id: String,
    pub kind: CfgEdgeKind,
}

impl CfgEdge {
    pub fn new(
        source_block_id: impl Into<String>,
        target_block_id: impl Into<String>,
        kind: CfgEdgeKind,
    ) -> Self {
        Self {
            source_block_id: source_block_id.into(),
            target_block_id: target_block_id.into(),
            kind,
        }
    }
}

/// Control-flow graph of one function
///
/// Invariants: exactly one Entry and one Exit block; every block reachable
/// from Entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    pub function_node_id: String,
    pub blocks: Vec<CfgBlock>,
    pub edges: Vec<CfgEdge>,
}

impl ControlFlowGraph {
    pub fn entry(&self) -> Option<&CfgBlock> {
        self.blocks.iter().find(|b| b.kind == CfgBlockKind::Entry)
    }

    pub fn exit(&self) -> Option<&CfgBlock> {
        self.blocks.iter().find(|b| b.kind == CfgBlockKind::Exit)
    }

    pub fn block(&self, id: &str) -> Option<&CfgBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn successors(&self, block_id: &str) -> Vec<(&CfgBlock, CfgEdgeKind)> {
        self.edges
            .iter()
            .filter(|e| e.source_block_id == block_id)
            .filter_map(|e| self.block(&e.target_block_id).map(|b| (b, e.kind)))
            .collect()
    }

    pub fn predecessors(&self, block_id: &str) -> Vec<&CfgBlock> {
        self.edges
            .iter()
            .filter(|e| e.target_block_id == block_id)
            .filter_map(|e| self.block(&e.source_block_id))
            .collect()
    }
}
