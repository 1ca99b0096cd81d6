//! Type and signature entities
//!
//! Types are modeled separately from the symbols that bear them; a node
//! references its declared type by id. Signature hashes are the sole
//! criterion for SIGNATURE-level impact classification, so they must be
//! stable under body edits and unstable under any parameter, return-type,
//! async/static, or visibility change.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Type expression flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFlavor {
    Primitive,
    Builtin,
    User,
    External,
    Typevar,
    Generic,
}

/// A type expression, separate from the symbols that bear it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeEntity {
    pub id: String,
    /// Raw source text of the annotation
    pub raw: String,
    /// Node id of the class/interface/alias this resolves to; None for
    /// primitives and externals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_target: Option<String>,
    pub flavor: TypeFlavor,
    pub is_nullable: bool,
    /// Ordered generic parameters, as TypeEntity ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_param_ids: Vec<String>,
}

impl TypeEntity {
    pub fn new(id: impl Into<String>, raw: impl Into<String>, flavor: TypeFlavor) -> Self {
        Self {
            id: id.into(),
            raw: raw.into(),
            resolved_target: None,
            flavor,
            is_nullable: false,
            generic_param_ids: Vec::new(),
        }
    }

    pub fn with_target(mut self, node_id: impl Into<String>) -> Self {
        self.resolved_target = Some(node_id.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn with_generic_params(mut self, ids: Vec<String>) -> Self {
        self.generic_param_ids = ids;
        self
    }
}

/// Symbol visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Public
    }
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }

    /// Python convention: single leading underscore is protected, double is
    /// private (dunder names stay public)
    pub fn from_python_name(name: &str) -> Self {
        if name.starts_with("__") && !name.ends_with("__") {
            Visibility::Private
        } else if name.starts_with('_') && !name.starts_with("__") {
            Visibility::Protected
        } else {
            Visibility::Public
        }
    }
}

/// Function/method signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureEntity {
    pub id: String,
    pub owner_node_id: String,
    pub name: String,
    /// Raw signature text as written
    pub raw: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter_type_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type_id: Option<String>,
    pub visibility: Visibility,
    pub is_async: bool,
    pub is_static: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub throws_type_ids: Vec<String>,
    /// SHA-1 of the normalized signature string
    pub signature_hash: String,
}

impl SignatureEntity {
    /// Build a signature, computing the hash from the normalized form.
    ///
    /// The normalized string covers name, ordered parameter types, return
    /// type, async/static flags, and visibility; it deliberately excludes
    /// anything the body can change.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        owner_node_id: impl Into<String>,
        name: impl Into<String>,
        raw: impl Into<String>,
        parameter_type_ids: Vec<String>,
        return_type_id: Option<String>,
        visibility: Visibility,
        is_async: bool,
        is_static: bool,
    ) -> Self {
        let name = name.into();
        let raw = raw.into();
        let signature_hash = Self::compute_hash(
            &name,
            &raw,
            &parameter_type_ids,
            return_type_id.as_deref(),
            visibility,
            is_async,
            is_static,
        );
        Self {
            id: id.into(),
            owner_node_id: owner_node_id.into(),
            name,
            raw,
            parameter_type_ids,
            return_type_id,
            visibility,
            is_async,
            is_static,
            throws_type_ids: Vec::new(),
            signature_hash,
        }
    }

    /// The normalized string covers the raw signature text (whitespace
    /// collapsed, so formatting noise never shifts it), the typed
    /// parameter list, and the flags. Body edits cannot reach any of it.
    #[allow(clippy::too_many_arguments)]
    fn compute_hash(
        name: &str,
        raw: &str,
        parameter_type_ids: &[String],
        return_type_id: Option<&str>,
        visibility: Visibility,
        is_async: bool,
        is_static: bool,
    ) -> String {
        let collapsed_raw: String = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let normalized = format!(
            "{}[{}]({})->{}|async={}|static={}|{}",
            name,
            collapsed_raw,
            parameter_type_ids.join(","),
            return_type_id.unwrap_or("-"),
            is_async,
            is_static,
            visibility.as_str(),
        );
        let mut hasher = Sha1::new();
        hasher.update(normalized.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: Vec<&str>, ret: Option<&str>, is_async: bool) -> SignatureEntity {
        SignatureEntity::new(
            "sig1",
            "node1",
            "foo",
            "def foo(...)",
            params.into_iter().map(String::from).collect(),
            ret.map(String::from),
            Visibility::Public,
            is_async,
            false,
        )
    }

    #[test]
    fn test_signature_hash_stable() {
        let a = sig(vec!["int"], Some("str"), false);
        let b = sig(vec!["int"], Some("str"), false);
        assert_eq!(a.signature_hash, b.signature_hash);
    }

    #[test]
    fn test_signature_hash_changes_on_param() {
        let a = sig(vec!["int"], None, false);
        let b = sig(vec!["int", "str"], None, false);
        assert_ne!(a.signature_hash, b.signature_hash);
    }

    #[test]
    fn test_signature_hash_changes_on_async() {
        let a = sig(vec![], None, false);
        let b = sig(vec![], None, true);
        assert_ne!(a.signature_hash, b.signature_hash);
    }

    #[test]
    fn test_python_visibility() {
        assert_eq!(Visibility::from_python_name("foo"), Visibility::Public);
        assert_eq!(Visibility::from_python_name("_foo"), Visibility::Protected);
        assert_eq!(Visibility::from_python_name("__foo"), Visibility::Private);
        assert_eq!(Visibility::from_python_name("__init__"), Visibility::Public);
    }
}
