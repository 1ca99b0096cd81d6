//! Shared models

mod cfg;
mod diagnostic;
mod document;
mod edge;
mod error;
mod node;
mod span;
mod type_entities;

pub use cfg::{CfgBlock, CfgBlockKind, CfgEdge, CfgEdgeKind, ControlFlowGraph};
pub use diagnostic::{Diagnostic, Severity};
pub use document::{FileIr, IrDocument, PackageMetadata, SCHEMA_VERSION};
pub use edge::{Edge, EdgeKind};
pub use error::{ErrorKind, IrError, Result};
pub use node::{Node, NodeKind};
pub use span::{Location, Span};
pub use type_entities::{SignatureEntity, TypeEntity, TypeFlavor, Visibility};

/// Node identifier type alias
pub type NodeId = String;
