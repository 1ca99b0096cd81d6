//! Type domain for narrowing analysis
//!
//! A small structural type model: enough to represent unions, None, and
//! named types so conditional narrowing can subtract and join them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Named(String),
    None,
    Union(Vec<Type>),
    /// Empty type (narrowed away entirely)
    Never,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    pub kind: TypeKind,
}

impl Type {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Named(name.into()),
        }
    }

    pub fn none() -> Self {
        Self { kind: TypeKind::None }
    }

    pub fn never() -> Self {
        Self { kind: TypeKind::Never }
    }

    pub fn unknown() -> Self {
        Self { kind: TypeKind::Unknown }
    }

    /// Build a union, flattening nested unions and deduplicating members
    pub fn union(types: Vec<Type>) -> Self {
        let mut members: Vec<Type> = Vec::new();
        for t in types {
            match t.kind {
                TypeKind::Union(inner) => {
                    for m in inner {
                        if !members.contains(&m) {
                            members.push(m);
                        }
                    }
                }
                TypeKind::Never => {}
                _ => {
                    if !members.contains(&t) {
                        members.push(t);
                    }
                }
            }
        }
        match members.len() {
            0 => Type::never(),
            1 => members.into_iter().next().unwrap(),
            _ => Self {
                kind: TypeKind::Union(members),
            },
        }
    }

    /// Parse an annotation string: `int | str | None`, `Optional[int]`,
    /// plain names. Anything unparseable is a named type.
    pub fn parse(annotation: &str) -> Self {
        let annotation = annotation.trim();
        if annotation.is_empty() {
            return Type::unknown();
        }
        if annotation == "None" {
            return Type::none();
        }
        if let Some(inner) = annotation
            .strip_prefix("Optional[")
            .and_then(|s| s.strip_suffix(']'))
        {
            return Type::union(vec![Type::parse(inner), Type::none()]);
        }
        if annotation.contains('|') {
            return Type::union(annotation.split('|').map(Type::parse).collect());
        }
        Type::named(annotation)
    }

    pub fn is_union(&self) -> bool {
        matches!(self.kind, TypeKind::Union(_))
    }

    pub fn includes(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        match &self.kind {
            TypeKind::Union(members) => members.contains(other),
            TypeKind::Unknown => true,
            _ => false,
        }
    }

    /// Remove a member type from this type (set subtraction on unions)
    pub fn subtract(&self, removed: &Type) -> Type {
        match &self.kind {
            TypeKind::Union(members) => {
                Type::union(members.iter().filter(|m| *m != removed).cloned().collect())
            }
            _ if self == removed => Type::never(),
            _ => self.clone(),
        }
    }

    pub fn to_display(&self) -> String {
        match &self.kind {
            TypeKind::Named(name) => name.clone(),
            TypeKind::None => "None".to_string(),
            TypeKind::Never => "Never".to_string(),
            TypeKind::Unknown => "Unknown".to_string(),
            TypeKind::Union(members) => members
                .iter()
                .map(Type::to_display)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_union_with_none() {
        let t = Type::parse("int | str | None");
        assert!(t.is_union());
        assert!(t.includes(&Type::none()));
        assert!(t.includes(&Type::named("int")));
    }

    #[test]
    fn test_parse_optional() {
        let t = Type::parse("Optional[int]");
        assert_eq!(t, Type::union(vec![Type::named("int"), Type::none()]));
    }

    #[test]
    fn test_subtract_collapses_singleton() {
        let t = Type::parse("int | None");
        assert_eq!(t.subtract(&Type::none()), Type::named("int"));
    }

    #[test]
    fn test_subtract_self_is_never() {
        assert_eq!(Type::named("int").subtract(&Type::named("int")), Type::never());
    }

    #[test]
    fn test_union_flattens_and_dedups() {
        let t = Type::union(vec![
            Type::parse("int | str"),
            Type::named("int"),
            Type::none(),
        ]);
        assert_eq!(t.to_display(), "int | str | None");
    }
}
