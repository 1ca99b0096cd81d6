/*
 * repolens-ir - code intelligence core
 *
 * Feature-first architecture:
 * - shared/    : IR models (Node, Edge, Span, types, signatures, CFG)
 * - features/  : vertical slices (parsing → ir_generation → cross_file →
 *                flow/data/type analysis → call graphs → overlay →
 *                retrieval → cache → storage ports → query surface)
 * - pipeline/  : batch orchestration (file-parallel with rayon)
 *
 * The IR is language-neutral; Python is the first registered generator.
 * Snapshots are immutable; derived structures (symbol table, call graph,
 * dependency DAG) are regenerated on load.
 */

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

/// Shared models and utilities
pub mod shared;

/// Feature modules
pub mod features;

/// Batch indexing pipeline
pub mod pipeline;

pub use pipeline::{process_batch, process_file, BatchResult};
pub use shared::models::{
    CfgBlock, CfgBlockKind, CfgEdge, CfgEdgeKind, ControlFlowGraph, Diagnostic, Edge, EdgeKind,
    FileIr, IrDocument, IrError, Node, NodeKind, Result, SignatureEntity, Span, TypeEntity,
    Visibility, SCHEMA_VERSION,
};
