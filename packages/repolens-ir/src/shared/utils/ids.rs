//! Deterministic node and edge id construction
//!
//! Definition ids are `<language>:<repo_relative_path>:<fqn>` — stable
//! across unrelated edits and free of line numbers, so whitespace edits
//! never shift them. Unresolved references get
//! `<language>:external:<raw_reference>`.

/// Id for a definition node
pub fn node_id(language: &str, relative_path: &str, fqn: &str) -> String {
    format!("{}:{}:{}", language, relative_path, fqn)
}

/// Id for a synthesized external node
pub fn external_id(language: &str, raw_reference: &str) -> String {
    format!("{}:external:{}", language, raw_reference)
}

pub fn is_external_id(id: &str) -> bool {
    id.contains(":external:")
}

/// Id for a CFG block inside a function
pub fn block_id(function_node_id: &str, index: usize) -> String {
    format!("{}#b{}", function_node_id, index)
}

/// Edge ids carry the owning file so per-file counters stay unique after
/// files merge into one snapshot; deterministic for identical input.
pub fn edge_id(file_path: &str, kind: &str, counter: usize) -> String {
    format!("edge:{}:{}:{}", file_path, kind.to_lowercase(), counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_shape() {
        assert_eq!(
            node_id("python", "src/app.py", "app.Service.run"),
            "python:src/app.py:app.Service.run"
        );
    }

    #[test]
    fn test_external_id_detection() {
        let id = external_id("python", "requests.get");
        assert_eq!(id, "python:external:requests.get");
        assert!(is_external_id(&id));
        assert!(!is_external_id(&node_id("python", "a.py", "a.f")));
    }

    #[test]
    fn test_edge_ids_unique_across_files() {
        assert_ne!(
            edge_id("a.py", "CALLS", 1),
            edge_id("b.py", "CALLS", 1)
        );
    }
}
