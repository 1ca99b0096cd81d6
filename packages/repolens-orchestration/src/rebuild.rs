//! Incremental rebuilder
//!
//! Two passes per session. Pass 1 rebuilds the files in the ChangeSet
//! according to their impact level and records the affected fqns. Pass 2
//! resolves those to files, subtracts what Pass 1 already processed, and
//! rebuilds the remainder — at most once, under a configurable ceiling.
//! Build modes gate how far the closure extends. Cancellation is checked
//! between files; partial progress is checkpointed so a session can
//! resume.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use repolens_ir::features::cross_file::build_global_context;
use repolens_ir::features::ir_generation::GeneratorRegistry;
use repolens_ir::features::parsing::SourceParser;
use repolens_ir::pipeline::process_file;
use repolens_ir::{EdgeKind, FileIr, IrDocument, NodeKind};

use crate::change_detector::ChangeSet;
use crate::checkpoint::{Checkpoint, CheckpointManager, StageId};
use crate::error::{OrchestratorError, Result};
use crate::impact::{classify_or_global, ImpactLevel, ImpactReport};
use crate::job::Job;
use crate::locks::FileLockSet;
use crate::stale::StaleEdgeTracker;

/// Build modes controlling pass selection and closure depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebuildMode {
    /// Pass 1 only
    Fast,
    /// Pass 1 + 1-hop impact closure
    Balanced,
    /// Pass 1 + 2-hop impact closure
    Deep,
    /// Everything, from scratch
    Bootstrap,
    /// Files that currently carry stale edges
    Repair,
}

#[derive(Debug, Clone)]
pub struct RebuildConfig {
    pub mode: RebuildMode,
    /// Pass 2 ceiling; beyond it the closure truncates with a warning
    pub impact_pass_max_files: usize,
    pub worker_pool_size: usize,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            mode: RebuildMode::Balanced,
            impact_pass_max_files: 200,
            worker_pool_size: num_cpus::get(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildOutcome {
    pub snapshot_id: String,
    /// True when every change classified NONE: the snapshot id did not
    /// advance and no IR was touched
    pub no_op: bool,
    pub files_processed: Vec<String>,
    pub files_failed: Vec<String>,
    pub affected_files: Vec<String>,
    pub impact_reports: Vec<ImpactReport>,
    pub pass2_truncated: bool,
    pub pass1_duration_ms: u64,
    pub pass2_duration_ms: u64,
}

pub struct IncrementalRebuilder {
    parser: Arc<dyn SourceParser>,
    generators: Arc<GeneratorRegistry>,
    checkpoints: Arc<CheckpointManager>,
    stale: Arc<StaleEdgeTracker>,
    config: RebuildConfig,
}

impl IncrementalRebuilder {
    pub fn new(
        parser: Arc<dyn SourceParser>,
        generators: Arc<GeneratorRegistry>,
        checkpoints: Arc<CheckpointManager>,
        stale: Arc<StaleEdgeTracker>,
        config: RebuildConfig,
    ) -> Self {
        Self {
            parser,
            generators,
            checkpoints,
            stale,
            config,
        }
    }

    /// Run one rebuild session. `all_files` is the current repository
    /// state as (path, source); `previous` is the last committed snapshot.
    /// Returns the new document plus session metrics; on a NONE-only
    /// session the previous document is returned untouched.
    pub async fn rebuild(
        &self,
        job: &Job,
        previous: &IrDocument,
        change_set: &ChangeSet,
        all_files: &[(String, String)],
        new_snapshot_id: &str,
        cancel: CancellationToken,
    ) -> Result<(IrDocument, RebuildOutcome)> {
        if self.config.mode == RebuildMode::Bootstrap {
            return self.bootstrap(&job.repo_id, all_files, new_snapshot_id, change_set);
        }

        let sources: HashMap<&str, &str> = all_files
            .iter()
            .map(|(p, s)| (p.as_str(), s.as_str()))
            .collect();

        // Working set: per-file IR projected from the previous snapshot
        let mut working: BTreeMap<String, FileIr> = previous
            .file_paths()
            .into_iter()
            .map(|path| (path.clone(), file_ir_projection(previous, &path)))
            .collect();

        let file_locks = FileLockSet::new();
        // Session-local dedup: a file is processed once per session
        let mut processed: HashSet<String> = HashSet::new();
        let mut files_failed: Vec<String> = Vec::new();
        let mut impact_reports: Vec<ImpactReport> = Vec::new();
        let mut affected_fqns: BTreeSet<String> = BTreeSet::new();
        let mut any_effective_change = false;

        // ── Pass 1: direct changes ──────────────────────────────────────
        let pass1_start = Instant::now();

        for path in change_set.files_to_build() {
            if cancel.is_cancelled() {
                self.checkpoint_processed(job, &processed)?;
                return Err(OrchestratorError::Cancelled);
            }
            let _guard = file_locks.try_lock(&path);
            let source = match sources.get(path.as_str()) {
                Some(source) => *source,
                None => continue,
            };

            let new_ir =
                match process_file(self.parser.as_ref(), &self.generators, source, &path) {
                    Ok(ir) => ir,
                    Err(error) => {
                        // Per-file containment: old IR stays, session continues
                        tracing::warn!(file = %path, %error, "file rebuild failed; retaining previous IR");
                        files_failed.push(path.clone());
                        processed.insert(path.clone());
                        continue;
                    }
                };

            match working.get(&path) {
                Some(old_ir) => {
                    let report = classify_or_global(old_ir, &new_ir);
                    tracing::debug!(file = %path, level = report.level.as_str(), "impact classified");
                    match report.level {
                        ImpactLevel::None => {
                            // Comment/whitespace only: skip entirely
                            impact_reports.push(report);
                            processed.insert(path.clone());
                            continue;
                        }
                        ImpactLevel::BodyLocal => {
                            affected_fqns.extend(report.affected_fqns.iter().cloned());
                        }
                        ImpactLevel::Signature => {
                            // Callers of the changed functions rebuild
                            for fqn in &report.affected_fqns {
                                affected_fqns.extend(callers_of_fqn(previous, fqn));
                            }
                        }
                        ImpactLevel::Interface | ImpactLevel::Global => {
                            // Importing files re-resolve
                            for importer in importers_of_file(previous, &path) {
                                affected_fqns.insert(format!("file:{}", importer));
                            }
                        }
                    }
                    impact_reports.push(report);
                }
                None => {
                    // Added file
                    any_effective_change = true;
                }
            }

            self.stale.mark_file_changed(previous, &path);
            working.insert(path.clone(), new_ir);
            processed.insert(path.clone());
            any_effective_change = true;
        }

        for deleted in &change_set.deleted {
            if working.remove(deleted).is_some() {
                any_effective_change = true;
                for importer in importers_of_file(previous, deleted) {
                    affected_fqns.insert(format!("file:{}", importer));
                }
                self.stale.mark_file_changed(previous, deleted);
            }
            processed.insert(deleted.clone());
        }

        let pass1_duration_ms = pass1_start.elapsed().as_millis() as u64;
        self.checkpoint_processed(job, &processed)?;

        // Scenario: a session whose every change is a no-op does not
        // advance the snapshot.
        if !any_effective_change {
            tracing::info!("all changes classified NONE; rebuild is a no-op");
            return Ok((
                previous.clone(),
                RebuildOutcome {
                    snapshot_id: previous.snapshot_id.clone(),
                    no_op: true,
                    files_processed: sorted(processed),
                    files_failed,
                    affected_files: Vec::new(),
                    impact_reports,
                    pass2_truncated: false,
                    pass1_duration_ms,
                    pass2_duration_ms: 0,
                },
            ));
        }

        // ── Pass 2: impact closure (runs at most once) ──────────────────
        let pass2_start = Instant::now();
        let mut pass2_truncated = false;
        let mut affected_files: BTreeSet<String> = BTreeSet::new();

        if self.config.mode != RebuildMode::Fast {
            affected_files = self.resolve_affected_files(previous, &affected_fqns);

            if self.config.mode == RebuildMode::Deep {
                // Second hop: dependents of the first hop
                let first_hop: Vec<String> = affected_files.iter().cloned().collect();
                for file in first_hop {
                    affected_files.extend(importers_of_file(previous, &file));
                }
            }
            if self.config.mode == RebuildMode::Repair {
                affected_files.extend(self.stale_files(previous));
            }

            affected_files.retain(|path| !processed.contains(path));

            if affected_files.len() > self.config.impact_pass_max_files {
                tracing::warn!(
                    affected = affected_files.len(),
                    ceiling = self.config.impact_pass_max_files,
                    "impact closure truncated"
                );
                pass2_truncated = true;
                affected_files = affected_files
                    .into_iter()
                    .take(self.config.impact_pass_max_files)
                    .collect();
            }

            for path in affected_files.clone() {
                if cancel.is_cancelled() {
                    self.checkpoint_processed(job, &processed)?;
                    return Err(OrchestratorError::Cancelled);
                }
                let _guard = file_locks.try_lock(&path);
                let source = match sources.get(path.as_str()) {
                    Some(source) => *source,
                    None => continue,
                };
                match process_file(self.parser.as_ref(), &self.generators, source, &path) {
                    Ok(ir) => {
                        working.insert(path.clone(), ir);
                        processed.insert(path.clone());
                    }
                    Err(error) => {
                        tracing::warn!(file = %path, %error, "affected-file rebuild failed");
                        files_failed.push(path.clone());
                    }
                }
            }
        }

        let pass2_duration_ms = pass2_start.elapsed().as_millis() as u64;

        // Re-resolve the whole working set and assemble the new snapshot
        let mut file_irs: Vec<FileIr> = working.into_values().collect();
        let _context = build_global_context(&mut file_irs);
        let mut document = IrDocument::from_files(&previous.repo_id, new_snapshot_id, file_irs);
        emit_arity_diagnostics(&mut document, &impact_reports);

        tracing::info!(
            processed = processed.len(),
            failed = files_failed.len(),
            affected = affected_files.len(),
            pass1_ms = pass1_duration_ms,
            pass2_ms = pass2_duration_ms,
            "rebuild session complete"
        );

        Ok((
            document,
            RebuildOutcome {
                snapshot_id: new_snapshot_id.to_string(),
                no_op: false,
                files_processed: sorted(processed),
                files_failed,
                affected_files: affected_files.into_iter().collect(),
                impact_reports,
                pass2_truncated,
                pass1_duration_ms,
                pass2_duration_ms,
            },
        ))
    }

    fn bootstrap(
        &self,
        repo_id: &str,
        all_files: &[(String, String)],
        new_snapshot_id: &str,
        change_set: &ChangeSet,
    ) -> Result<(IrDocument, RebuildOutcome)> {
        let start = Instant::now();
        let batch = repolens_ir::pipeline::process_batch(
            Arc::clone(&self.parser),
            Arc::clone(&self.generators),
            repo_id,
            new_snapshot_id,
            all_files,
        );
        let mut document = batch.document;
        // Bootstrap ignores the change set beyond logging
        tracing::info!(
            changed = change_set.len(),
            files = batch.files_succeeded,
            "bootstrap rebuild"
        );
        document.snapshot_id = new_snapshot_id.to_string();
        let outcome = RebuildOutcome {
            snapshot_id: new_snapshot_id.to_string(),
            no_op: false,
            files_processed: all_files.iter().map(|(p, _)| p.clone()).collect(),
            files_failed: Vec::new(),
            affected_files: Vec::new(),
            impact_reports: Vec::new(),
            pass2_truncated: false,
            pass1_duration_ms: start.elapsed().as_millis() as u64,
            pass2_duration_ms: 0,
        };
        Ok((document, outcome))
    }

    /// Affected markers are fqns (caller functions) or `file:<path>`
    /// entries (importers); both resolve to files here.
    fn resolve_affected_files(
        &self,
        previous: &IrDocument,
        affected_fqns: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        let mut files = BTreeSet::new();
        for marker in affected_fqns {
            if let Some(path) = marker.strip_prefix("file:") {
                files.insert(path.to_string());
            } else if let Some(node) = previous.node_by_fqn(marker) {
                files.insert(node.file_path.clone());
            }
        }
        files
    }

    fn stale_files(&self, previous: &IrDocument) -> BTreeSet<String> {
        let node_files: HashMap<&str, &str> = previous
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n.file_path.as_str()))
            .collect();
        previous
            .edges
            .iter()
            .filter(|e| self.stale.is_stale(&e.id))
            .filter_map(|e| node_files.get(e.source_id.as_str()))
            .map(|path| path.to_string())
            .collect()
    }

    fn checkpoint_processed(&self, job: &Job, processed: &HashSet<String>) -> Result<()> {
        let list: Vec<&String> = processed.iter().collect();
        let checkpoint = Checkpoint::of(job.id, StageId::Generate, "processed_files", &list)?;
        self.checkpoints.save(checkpoint);
        Ok(())
    }
}

/// Project one file's slice of a snapshot back into a FileIr
pub fn file_ir_projection(doc: &IrDocument, file_path: &str) -> FileIr {
    let module_path = doc
        .nodes_in_file(file_path)
        .find(|n| n.kind == NodeKind::File)
        .and_then(|n| n.module_path.clone())
        .unwrap_or_default();
    let language = doc
        .nodes_in_file(file_path)
        .next()
        .map(|n| n.language.clone())
        .unwrap_or_else(|| "python".to_string());

    let node_ids: HashSet<&str> = doc
        .nodes_in_file(file_path)
        .map(|n| n.id.as_str())
        .collect();

    let mut ir = FileIr::new(file_path, language, module_path);
    ir.nodes = doc.nodes_in_file(file_path).cloned().collect();
    ir.edges = doc
        .edges
        .iter()
        .filter(|e| node_ids.contains(e.source_id.as_str()))
        .cloned()
        .collect();
    ir.signatures = doc
        .signatures
        .iter()
        .filter(|s| node_ids.contains(s.owner_node_id.as_str()))
        .cloned()
        .collect();
    ir.control_flow_graphs = doc
        .control_flow_graphs
        .iter()
        .filter(|c| node_ids.contains(c.function_node_id.as_str()))
        .cloned()
        .collect();
    ir
}

/// After a signature change, flag call sites whose argument count no
/// longer matches the new parameter count.
fn emit_arity_diagnostics(doc: &mut IrDocument, reports: &[ImpactReport]) {
    let mut diagnostics = Vec::new();
    for report in reports {
        if report.level != ImpactLevel::Signature {
            continue;
        }
        for fqn in &report.affected_fqns {
            let (node_id, param_count) = match doc.node_by_fqn(fqn) {
                Some(node) => match node.attr("param_count").and_then(|v| v.as_u64()) {
                    Some(count) => (node.id.clone(), count),
                    None => continue,
                },
                None => continue,
            };
            let node_files: HashMap<&str, &str> = doc
                .nodes
                .iter()
                .map(|n| (n.id.as_str(), n.file_path.as_str()))
                .collect();
            for edge in doc.edges.iter() {
                if edge.kind != EdgeKind::Calls || edge.target_id != node_id {
                    continue;
                }
                let arg_count = match edge.attr("arg_count").and_then(|v| v.as_u64()) {
                    Some(count) => count,
                    None => continue,
                };
                if arg_count != param_count {
                    let caller_file = node_files
                        .get(edge.source_id.as_str())
                        .copied()
                        .unwrap_or_default()
                        .to_string();
                    diagnostics.push(
                        repolens_ir::Diagnostic::warning(
                            "rebuild",
                            caller_file,
                            format!(
                                "call to {} passes {} argument(s) but the signature now takes {}",
                                fqn, arg_count, param_count
                            ),
                        ),
                    );
                }
            }
        }
    }
    doc.diagnostics.extend(diagnostics);
}

/// Callers (by fqn) of a function, from the previous snapshot's CALLS edges
fn callers_of_fqn(doc: &IrDocument, fqn: &str) -> Vec<String> {
    let target_ids: HashSet<&str> = doc
        .nodes
        .iter()
        .filter(|n| n.fqn == fqn)
        .map(|n| n.id.as_str())
        .collect();
    let node_fqns: HashMap<&str, &str> = doc
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n.fqn.as_str()))
        .collect();
    doc.edges
        .iter()
        .filter(|e| e.kind == EdgeKind::Calls && target_ids.contains(e.target_id.as_str()))
        .filter_map(|e| node_fqns.get(e.source_id.as_str()))
        .map(|fqn| fqn.to_string())
        .collect()
}

/// Files importing symbols of `file_path`, from IMPORTS edges
fn importers_of_file(doc: &IrDocument, file_path: &str) -> Vec<String> {
    let file_node_ids: HashSet<&str> = doc
        .nodes_in_file(file_path)
        .map(|n| n.id.as_str())
        .collect();
    let node_files: HashMap<&str, &str> = doc
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n.file_path.as_str()))
        .collect();

    let mut importers: Vec<String> = doc
        .edges
        .iter()
        .filter(|e| e.kind == EdgeKind::Imports && file_node_ids.contains(e.target_id.as_str()))
        .filter_map(|e| node_files.get(e.source_id.as_str()))
        .filter(|path| **path != file_path)
        .map(|path| path.to_string())
        .collect();
    importers.sort();
    importers.dedup();
    importers
}

fn sorted(set: HashSet<String>) -> Vec<String> {
    let mut list: Vec<String> = set.into_iter().collect();
    list.sort();
    list
}
