//! Type resolution: the structural type model and conditional narrowing.

pub mod domain;
pub mod narrowing;

pub use domain::{Type, TypeKind};
pub use narrowing::{NarrowingCondition, TypeState};
