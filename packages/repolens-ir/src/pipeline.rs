//! Indexing pipeline
//!
//! Parse → generate IR → build CFGs → emit data flow, file-parallel with
//! rayon; then cross-file resolution over the batch. Per-file failures are
//! contained: the file is skipped with a diagnostic and the batch
//! continues.

use rayon::prelude::*;
use std::sync::Arc;

use crate::features::cross_file::{build_global_context, GlobalContext};
use crate::features::data_flow::emit_data_flow;
use crate::features::flow_graph::build_flow_graphs;
use crate::features::ir_generation::GeneratorRegistry;
use crate::features::parsing::SourceParser;
use crate::shared::models::{FileIr, IrDocument, IrError, Result};

/// Gather (relative_path, source) pairs for every file the parser
/// supports under `root`, in deterministic path order.
pub fn collect_source_files(
    root: &std::path::Path,
    parser: &dyn SourceParser,
) -> Result<Vec<(String, String)>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if !parser.supports_extension(ext) {
            continue;
        }
        let source = std::fs::read_to_string(entry.path())?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        files.push((relative, source));
    }
    Ok(files)
}

/// Process one source file into its IR
pub fn process_file(
    parser: &dyn SourceParser,
    generators: &GeneratorRegistry,
    source: &str,
    file_path: &str,
) -> Result<FileIr> {
    let tree = parser.parse(source, file_path)?;
    let generator = generators
        .get(parser.language_name())
        .ok_or_else(|| {
            IrError::ir_generation(format!("no generator for {}", parser.language_name()))
        })?;
    let mut ir = generator.generate(&tree, None)?;
    build_flow_graphs(&tree, &mut ir);
    emit_data_flow(&mut ir);
    Ok(ir)
}

/// Batch result: the assembled snapshot and its resolution context
pub struct BatchResult {
    pub document: IrDocument,
    pub context: GlobalContext,
    pub files_succeeded: usize,
    pub files_failed: usize,
}

/// Process a repository batch into one IR snapshot.
///
/// Files are processed in parallel; the worker pool is rayon's, bounded by
/// the configured thread count. Within a file, processing is sequential.
pub fn process_batch(
    parser: Arc<dyn SourceParser>,
    generators: Arc<GeneratorRegistry>,
    repo_id: &str,
    snapshot_id: &str,
    files: &[(String, String)],
) -> BatchResult {
    tracing::debug!(
        files = files.len(),
        workers = num_cpus::get(),
        "starting batch"
    );
    let results: Vec<std::result::Result<FileIr, (String, IrError)>> = files
        .par_iter()
        .map(|(path, source)| {
            process_file(parser.as_ref(), &generators, source, path)
                .map_err(|e| (path.clone(), e))
        })
        .collect();

    let mut file_irs: Vec<FileIr> = Vec::with_capacity(results.len());
    let mut files_failed = 0usize;
    for result in results {
        match result {
            Ok(ir) => file_irs.push(ir),
            Err((path, error)) => {
                files_failed += 1;
                tracing::warn!(file = %path, %error, "file failed, continuing batch");
            }
        }
    }

    let context = build_global_context(&mut file_irs);
    let files_succeeded = file_irs.len();
    let document = IrDocument::from_files(repo_id, snapshot_id, file_irs);

    tracing::info!(
        files = files_succeeded,
        failed = files_failed,
        nodes = document.nodes.len(),
        edges = document.edges.len(),
        "batch indexed"
    );

    BatchResult {
        document,
        context,
        files_succeeded,
        files_failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::TreeSitterParser;
    use crate::shared::models::EdgeKind;

    fn batch(files: &[(&str, &str)]) -> BatchResult {
        let owned: Vec<(String, String)> = files
            .iter()
            .map(|(p, s)| (p.to_string(), s.to_string()))
            .collect();
        process_batch(
            Arc::new(TreeSitterParser::python()),
            Arc::new(GeneratorRegistry::with_defaults()),
            "repo",
            "branch:main@abc",
            &owned,
        )
    }

    #[test]
    fn test_empty_repository() {
        let result = batch(&[]);
        assert_eq!(result.files_succeeded, 0);
        assert!(result.document.nodes.is_empty());
        assert!(result.document.validate().is_ok());
    }

    #[test]
    fn test_cross_file_calls_resolve_through_batch() {
        let result = batch(&[
            ("utils.py", "def helper():\n    return 1\n"),
            (
                "main.py",
                "from utils import helper\n\ndef run():\n    return helper()\n",
            ),
        ]);

        assert_eq!(result.files_succeeded, 2);
        assert!(result.document.validate().is_ok());

        // The import edge resolved to the canonical node id
        let import_edge = result
            .document
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Imports)
            .unwrap();
        assert_eq!(import_edge.target_id, "python:utils.py:utils.helper");

        assert_eq!(
            result.context.topological_order,
            vec!["utils.py", "main.py"]
        );
    }

    #[test]
    fn test_snapshot_document_validates() {
        let result = batch(&[(
            "app.py",
            "class Service:\n    def run(self):\n        return 1\n\ndef make():\n    return Service()\n",
        )]);
        assert!(result.document.validate().is_ok());
    }

    #[test]
    fn test_collect_source_files_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn main() {}\n").unwrap();

        let parser = TreeSitterParser::python();
        let files = collect_source_files(dir.path(), &parser).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "a.py");
    }

    #[test]
    fn test_batch_rerun_is_stable() {
        let files = &[("a.py", "def f():\n    return 1\n")];
        let first = batch(files);
        let second = batch(files);
        let ids_a: Vec<_> = first.document.nodes.iter().map(|n| n.id.clone()).collect();
        let ids_b: Vec<_> = second.document.nodes.iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }
}
