//! Change detection
//!
//! Three strategies in priority order: a provided diff, blake3 file
//! hashes, and modification times as the fallback. All of them produce the
//! same ChangeSet shape.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::Result;

/// Added / modified / deleted file paths
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// Files that need (re)indexing
    pub fn files_to_build(&self) -> Vec<String> {
        self.added.iter().chain(self.modified.iter()).cloned().collect()
    }
}

/// One entry from a diff-providing source control adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffEntry {
    Added(String),
    Modified(String),
    Deleted(String),
    Renamed { from: String, to: String },
}

/// Strategy 1: diff-provided. A rename is a delete plus an add.
pub fn from_diff(entries: &[DiffEntry]) -> ChangeSet {
    let mut change_set = ChangeSet::default();
    for entry in entries {
        match entry {
            DiffEntry::Added(path) => {
                change_set.added.insert(path.clone());
            }
            DiffEntry::Modified(path) => {
                change_set.modified.insert(path.clone());
            }
            DiffEntry::Deleted(path) => {
                change_set.deleted.insert(path.clone());
            }
            DiffEntry::Renamed { from, to } => {
                change_set.deleted.insert(from.clone());
                change_set.added.insert(to.clone());
            }
        }
    }
    change_set
}

/// Strategy 2: content hashes. `previous` maps path → blake3 hash from the
/// last snapshot; `current` is (path, content) for the present state.
pub fn from_hashes(
    previous: &HashMap<String, String>,
    current: &[(String, String)],
) -> ChangeSet {
    let mut change_set = ChangeSet::default();
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    for (path, content) in current {
        seen.insert(path.as_str());
        let hash = blake3::hash(content.as_bytes()).to_hex().to_string();
        match previous.get(path) {
            None => {
                change_set.added.insert(path.clone());
            }
            Some(old_hash) if *old_hash != hash => {
                change_set.modified.insert(path.clone());
            }
            Some(_) => {}
        }
    }
    for path in previous.keys() {
        if !seen.contains(path.as_str()) {
            change_set.deleted.insert(path.clone());
        }
    }
    change_set
}

/// Hash every file under a root (for the next snapshot's baseline)
pub fn hash_tree(root: &Path, extension: &str) -> Result<HashMap<String, String>> {
    let mut hashes = HashMap::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let bytes = std::fs::read(path)?;
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();
        hashes.insert(relative, blake3::hash(&bytes).to_hex().to_string());
    }
    Ok(hashes)
}

/// Strategy 3: modification times. `previous` maps path → mtime from the
/// last scan. Least precise; only used when hashes are unavailable.
pub fn from_mtimes(
    previous: &HashMap<String, SystemTime>,
    current: &[(String, SystemTime)],
) -> ChangeSet {
    let mut change_set = ChangeSet::default();
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    for (path, mtime) in current {
        seen.insert(path.as_str());
        match previous.get(path) {
            None => {
                change_set.added.insert(path.clone());
            }
            Some(old) if old != mtime => {
                change_set.modified.insert(path.clone());
            }
            Some(_) => {}
        }
    }
    for path in previous.keys() {
        if !seen.contains(path.as_str()) {
            change_set.deleted.insert(path.clone());
        }
    }
    change_set
}
