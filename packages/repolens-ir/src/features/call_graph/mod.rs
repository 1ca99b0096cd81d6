//! Call graphs
//!
//! Context-insensitive by default: CALLS edges merged by (caller, callee).
//! The optional context-sensitive layer refines calls by call site and
//! constant argument values, up to a configurable depth.

mod builder;
mod context;

pub use builder::{CallGraph, CallGraphStats};
pub use context::{CallContext, ContextConfig, ContextSensitiveCallGraph};
