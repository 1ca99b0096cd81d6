//! Control-flow graph construction
//!
//! Single-pass traversal of a function body, partitioning basic blocks at
//! branches, loops, try/except/finally, and terminators. Produces one CFG
//! per function/method/lambda with the Entry/Exit invariants enforced.

mod builder;

pub use builder::{build_cfg, build_flow_graphs};
