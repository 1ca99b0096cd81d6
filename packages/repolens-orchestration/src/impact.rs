//! Impact classification
//!
//! Compares the previous IR of a modified file against a preview of its
//! new IR and grades the change NONE / BODY_LOCAL / SIGNATURE / INTERFACE
//! / GLOBAL. Classification failures degrade conservatively to GLOBAL.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use repolens_ir::{FileIr, NodeKind};

/// Impact level, ordered by severity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImpactLevel {
    /// Comments/whitespace only; every content hash preserved
    None,
    /// A body changed but its signature did not
    BodyLocal,
    /// A function or method signature hash changed
    Signature,
    /// A class's public surface changed
    Interface,
    /// Module exports or import relationships changed
    Global,
}

impl ImpactLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::None => "NONE",
            ImpactLevel::BodyLocal => "BODY_LOCAL",
            ImpactLevel::Signature => "SIGNATURE",
            ImpactLevel::Interface => "INTERFACE",
            ImpactLevel::Global => "GLOBAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactReport {
    pub file_path: String,
    pub level: ImpactLevel,
    /// Symbols whose change drove the classification (e.g. the functions
    /// whose callers must rebuild)
    pub affected_fqns: Vec<String>,
    pub reasons: Vec<String>,
}

/// Classify one modified file. Falls back to GLOBAL when the comparison
/// itself fails.
pub fn classify_or_global(old: &FileIr, new: &FileIr) -> ImpactReport {
    match classify(old, new) {
        Ok(report) => report,
        Err(reason) => {
            tracing::warn!(file = %new.file_path, %reason, "impact classification failed; falling back to GLOBAL");
            ImpactReport {
                file_path: new.file_path.clone(),
                level: ImpactLevel::Global,
                affected_fqns: Vec::new(),
                reasons: vec![format!("classification error: {}", reason)],
            }
        }
    }
}

pub fn classify(old: &FileIr, new: &FileIr) -> Result<ImpactReport, String> {
    if old.file_path != new.file_path {
        return Err(format!(
            "file mismatch: {} vs {}",
            old.file_path, new.file_path
        ));
    }

    let mut level = ImpactLevel::None;
    let mut affected_fqns: BTreeSet<String> = BTreeSet::new();
    let mut reasons: Vec<String> = Vec::new();
    let mut raise = |current: &mut ImpactLevel, candidate: ImpactLevel, reason: String,
                     reasons: &mut Vec<String>| {
        if candidate > *current {
            *current = candidate;
        }
        reasons.push(reason);
    };

    // GLOBAL: module exports changed
    let old_exports = module_exports(old);
    let new_exports = module_exports(new);
    if old_exports != new_exports {
        raise(
            &mut level,
            ImpactLevel::Global,
            format!(
                "module exports changed ({} -> {} public symbols)",
                old_exports.len(),
                new_exports.len()
            ),
            &mut reasons,
        );
    }

    // GLOBAL: import relationships changed
    let old_imports = import_targets(old);
    let new_imports = import_targets(new);
    if old_imports != new_imports {
        raise(
            &mut level,
            ImpactLevel::Global,
            "import relationships changed".to_string(),
            &mut reasons,
        );
    }

    // INTERFACE: class public surface changed
    let old_surface = class_surfaces(old);
    let new_surface = class_surfaces(new);
    for (class_fqn, old_members) in &old_surface {
        if let Some(new_members) = new_surface.get(class_fqn) {
            if old_members != new_members {
                affected_fqns.insert(class_fqn.clone());
                raise(
                    &mut level,
                    ImpactLevel::Interface,
                    format!("public surface of {} changed", class_fqn),
                    &mut reasons,
                );
            }
        }
    }

    // SIGNATURE / BODY_LOCAL: per-function comparison
    let old_functions = function_states(old);
    let new_functions = function_states(new);
    for (fqn, (old_sig, old_body)) in &old_functions {
        match new_functions.get(fqn) {
            Some((new_sig, new_body)) => {
                if old_sig != new_sig {
                    affected_fqns.insert(fqn.clone());
                    raise(
                        &mut level,
                        ImpactLevel::Signature,
                        format!("signature of {} changed", fqn),
                        &mut reasons,
                    );
                } else if old_body != new_body {
                    affected_fqns.insert(fqn.clone());
                    raise(
                        &mut level,
                        ImpactLevel::BodyLocal,
                        format!("body of {} changed", fqn),
                        &mut reasons,
                    );
                }
            }
            None => {
                // Removed function: public removals already graded GLOBAL
                // via exports; private ones rebuild this file only.
                affected_fqns.insert(fqn.clone());
                raise(
                    &mut level,
                    ImpactLevel::BodyLocal,
                    format!("{} removed", fqn),
                    &mut reasons,
                );
            }
        }
    }
    for fqn in new_functions.keys() {
        if !old_functions.contains_key(fqn) {
            affected_fqns.insert(fqn.clone());
            raise(
                &mut level,
                ImpactLevel::BodyLocal,
                format!("{} added", fqn),
                &mut reasons,
            );
        }
    }

    Ok(ImpactReport {
        file_path: new.file_path.clone(),
        level,
        affected_fqns: affected_fqns.into_iter().collect(),
        reasons,
    })
}

/// Public top-level symbols (the module's export surface)
fn module_exports(ir: &FileIr) -> BTreeSet<String> {
    let file_node_id = ir
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::File)
        .map(|n| n.id.clone());

    ir.nodes
        .iter()
        .filter(|n| {
            matches!(
                n.kind,
                NodeKind::Function | NodeKind::Class | NodeKind::Variable
            )
        })
        .filter(|n| n.parent_id == file_node_id)
        .map(|n| n.display_name().to_string())
        .filter(|name| !name.starts_with('_'))
        .collect()
}

/// Imported fqns referenced by the file. Import nodes carry the imported
/// fqn in both resolved and unresolved IR, so the comparison is stable
/// whether or not edge targets were rewritten to node ids.
fn import_targets(ir: &FileIr) -> BTreeSet<String> {
    ir.nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Import)
        .map(|n| n.fqn.clone())
        .collect()
}

/// class fqn → public member names
fn class_surfaces(ir: &FileIr) -> BTreeMap<String, BTreeSet<String>> {
    let mut surfaces: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let classes: BTreeMap<&str, &str> = ir
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Class)
        .map(|n| (n.id.as_str(), n.fqn.as_str()))
        .collect();

    for node in &ir.nodes {
        if !matches!(node.kind, NodeKind::Method | NodeKind::Field) {
            continue;
        }
        if let Some(parent_id) = &node.parent_id {
            if let Some(class_fqn) = classes.get(parent_id.as_str()) {
                let name = node.display_name().to_string();
                if !name.starts_with('_') || name.starts_with("__") && name.ends_with("__") {
                    surfaces
                        .entry(class_fqn.to_string())
                        .or_default()
                        .insert(name);
                }
            }
        }
    }
    for fqn in classes.values() {
        surfaces.entry(fqn.to_string()).or_default();
    }
    surfaces
}

/// fqn → (signature hash, content hash) for every callable
fn function_states(ir: &FileIr) -> BTreeMap<String, (Option<String>, Option<String>)> {
    ir.nodes
        .iter()
        .filter(|n| n.kind.is_callable())
        .map(|n| {
            let sig_hash = n
                .signature_id
                .as_ref()
                .and_then(|sig_id| ir.signatures.iter().find(|s| &s.id == sig_id))
                .map(|s| s.signature_hash.clone());
            (n.fqn.clone(), (sig_hash, n.content_hash.clone()))
        })
        .collect()
}
