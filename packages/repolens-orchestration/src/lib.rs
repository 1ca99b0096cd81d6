//! repolens-orchestration
//!
//! The rebuild side of the engine: change detection, impact
//! classification, two-pass incremental rebuild sessions, snapshot
//! retention, stale-edge management, locks, checkpoints, and the job
//! lifecycle. The IR core (`repolens-ir`) does the per-file work; this
//! crate decides what to rebuild and guards the concurrency invariants:
//! one rebuilder per (repo, snapshot), Pass 1 strictly before Pass 2,
//! cancellation between files.

pub mod change_detector;
pub mod checkpoint;
pub mod error;
pub mod impact;
pub mod job;
pub mod locks;
pub mod rebuild;
pub mod snapshot;
pub mod stale;

pub use change_detector::{ChangeSet, DiffEntry};
pub use checkpoint::{Checkpoint, CheckpointManager, StageId};
pub use error::{ErrorCategory, OrchestratorError, Result};
pub use impact::{classify, classify_or_global, ImpactLevel, ImpactReport};
pub use job::{Job, JobState, SubmitOutcome};
pub use locks::{FileLockSet, RepoSnapshotLock};
pub use rebuild::{IncrementalRebuilder, RebuildConfig, RebuildMode, RebuildOutcome};
pub use snapshot::{RetentionPolicy, SnapshotManager};
pub use stale::StaleEdgeTracker;
