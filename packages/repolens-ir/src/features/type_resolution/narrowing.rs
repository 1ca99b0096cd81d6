//! Conditional type narrowing
//!
//! Narrowing conditions extracted from branch conditions refine a
//! variable's type on each outgoing edge of the branch. At a join point
//! the state is the union of predecessor states, variable by variable.

use std::collections::HashMap;

use super::domain::Type;

/// A recognized narrowing condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrowingCondition {
    /// isinstance(x, T) / x instanceof T / typeof x === "T"
    IsInstance { var: String, type_name: String },
    /// x is None / x == None
    IsNone { var: String },
    /// x is not None
    IsNotNone { var: String },
    /// truthy `if x`
    Truthy { var: String },
    /// user-defined predicate returning TypeGuard[T]
    TypeGuard { var: String, type_name: String },
}

impl NarrowingCondition {
    pub fn var(&self) -> &str {
        match self {
            NarrowingCondition::IsInstance { var, .. }
            | NarrowingCondition::IsNone { var }
            | NarrowingCondition::IsNotNone { var }
            | NarrowingCondition::Truthy { var }
            | NarrowingCondition::TypeGuard { var, .. } => var,
        }
    }

    /// Narrowed type for the variable on the given branch.
    /// Returns None when the branch leaves the type unrefined.
    pub fn apply(&self, original: &Type, true_branch: bool) -> Option<Type> {
        match self {
            NarrowingCondition::IsInstance { type_name, .. }
            | NarrowingCondition::TypeGuard { type_name, .. } => {
                let target = Type::named(type_name.clone());
                if true_branch {
                    Some(target)
                } else {
                    Some(original.subtract(&target))
                }
            }
            NarrowingCondition::IsNone { .. } => {
                if true_branch {
                    Some(Type::none())
                } else {
                    Some(original.subtract(&Type::none()))
                }
            }
            NarrowingCondition::IsNotNone { .. } => {
                if true_branch {
                    Some(original.subtract(&Type::none()))
                } else {
                    Some(Type::none())
                }
            }
            NarrowingCondition::Truthy { .. } => {
                if true_branch {
                    Some(original.subtract(&Type::none()))
                } else {
                    // `if x` being false does not pin x to None for
                    // non-optional types; keep the original.
                    None
                }
            }
        }
    }
}

/// Per-block type state: variable → narrowed type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeState {
    vars: HashMap<String, Type>,
}

impl TypeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, var: impl Into<String>, ty: Type) {
        self.vars.insert(var.into(), ty);
    }

    pub fn get(&self, var: &str) -> Option<&Type> {
        self.vars.get(var)
    }

    /// Successor state along a conditional edge. A branch that refines
    /// nothing (e.g. the false side of a truthiness check) keeps the
    /// existing binding rather than dropping it.
    pub fn apply(&self, condition: &NarrowingCondition, true_branch: bool) -> TypeState {
        let mut next = self.clone();
        let original = self
            .vars
            .get(condition.var())
            .cloned()
            .unwrap_or_else(Type::unknown);
        if let Some(narrowed) = condition.apply(&original, true_branch) {
            next.vars.insert(condition.var().to_string(), narrowed);
        }
        next
    }

    /// Join of predecessor states: union variable by variable. A variable
    /// missing in one predecessor is unknown there, so it stays unrefined.
    pub fn join(states: &[TypeState]) -> TypeState {
        let mut joined = TypeState::new();
        if states.is_empty() {
            return joined;
        }
        let first = &states[0];
        for (var, ty) in &first.vars {
            let mut members = vec![ty.clone()];
            let mut present_everywhere = true;
            for other in &states[1..] {
                match other.get(var) {
                    Some(other_ty) => members.push(other_ty.clone()),
                    None => {
                        present_everywhere = false;
                        break;
                    }
                }
            }
            if present_everywhere {
                joined.set(var.clone(), Type::union(members));
            }
        }
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isinstance_narrowing_both_branches() {
        let cond = NarrowingCondition::IsInstance {
            var: "x".into(),
            type_name: "str".into(),
        };
        let original = Type::parse("int | str");

        assert_eq!(cond.apply(&original, true), Some(Type::named("str")));
        assert_eq!(cond.apply(&original, false), Some(Type::named("int")));
    }

    #[test]
    fn test_is_none_narrowing() {
        let cond = NarrowingCondition::IsNone { var: "x".into() };
        let original = Type::parse("int | None");
        assert_eq!(cond.apply(&original, true), Some(Type::none()));
        assert_eq!(cond.apply(&original, false), Some(Type::named("int")));
    }

    #[test]
    fn test_truthy_false_branch_keeps_original() {
        let cond = NarrowingCondition::Truthy { var: "x".into() };
        let original = Type::named("int");
        assert_eq!(cond.apply(&original, false), None);
    }

    #[test]
    fn test_state_apply_and_join() {
        let mut base = TypeState::new();
        base.set("x", Type::parse("int | str"));

        let cond = NarrowingCondition::IsInstance {
            var: "x".into(),
            type_name: "int".into(),
        };
        let then_state = base.apply(&cond, true);
        let else_state = base.apply(&cond, false);
        assert_eq!(then_state.get("x"), Some(&Type::named("int")));
        assert_eq!(else_state.get("x"), Some(&Type::named("str")));

        // Join restores the union
        let joined = TypeState::join(&[then_state, else_state]);
        assert_eq!(joined.get("x"), Some(&Type::parse("int | str")));
    }

    #[test]
    fn test_truthy_false_branch_keeps_binding() {
        let mut base = TypeState::new();
        base.set("x", Type::named("int"));
        let cond = NarrowingCondition::Truthy { var: "x".into() };
        let state = base.apply(&cond, false);
        assert_eq!(state.get("x"), Some(&Type::named("int")));
    }

    #[test]
    fn test_typeguard_narrows_like_isinstance() {
        let cond = NarrowingCondition::TypeGuard {
            var: "x".into(),
            type_name: "Order".into(),
        };
        let original = Type::unknown();
        assert_eq!(cond.apply(&original, true), Some(Type::named("Order")));
    }
}
