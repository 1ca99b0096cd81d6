//! Rebuild job model
//!
//! Jobs move Queued → Running → Completed/Failed/Cancelled. Lock
//! contention resolves to Deduped (same target already building),
//! Superseded (a newer request replaces this one), or Queued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::ErrorCategory;

/// Outcome of submitting a job against the repo-snapshot lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Lock acquired; this job runs
    Accepted,
    /// Another job is already building the same target
    Deduped { holder: Uuid },
    /// This newer request replaced a running lower-priority job
    Superseded { superseded: Uuid },
    /// Waiting for the lock
    Queued,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobState {
    Queued {
        queued_at: DateTime<Utc>,
        priority: i32,
    },
    Running {
        started_at: DateTime<Utc>,
        worker_id: String,
        checkpoint_id: Option<Uuid>,
    },
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        duration_ms: u64,
        files_processed: usize,
    },
    Failed {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        error: String,
        error_category: ErrorCategory,
        retry_count: u32,
        next_retry_at: Option<DateTime<Utc>>,
    },
    Cancelled {
        cancelled_at: DateTime<Utc>,
        reason: String,
    },
}

impl JobState {
    pub fn state_name(&self) -> &'static str {
        match self {
            JobState::Queued { .. } => "queued",
            JobState::Running { .. } => "running",
            JobState::Completed { .. } => "completed",
            JobState::Failed { .. } => "failed",
            JobState::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed { .. } | JobState::Failed { .. } | JobState::Cancelled { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub repo_id: String,
    pub snapshot_id: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Incremental rebuild metadata
    pub changed_files: Option<HashSet<String>>,
    pub previous_snapshot_id: Option<String>,
}

impl Job {
    /// New queued full-rebuild job
    pub fn new_queued(repo_id: String, snapshot_id: String, priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            repo_id,
            snapshot_id,
            state: JobState::Queued {
                queued_at: now,
                priority,
            },
            created_at: now,
            updated_at: now,
            changed_files: None,
            previous_snapshot_id: None,
        }
    }

    /// New queued incremental job
    pub fn new_incremental(
        repo_id: String,
        snapshot_id: String,
        priority: i32,
        changed_files: HashSet<String>,
        previous_snapshot_id: String,
    ) -> Self {
        let mut job = Self::new_queued(repo_id, snapshot_id, priority);
        job.changed_files = Some(changed_files);
        job.previous_snapshot_id = Some(previous_snapshot_id);
        job
    }

    pub fn start(&mut self, worker_id: String) {
        let now = Utc::now();
        self.state = JobState::Running {
            started_at: now,
            worker_id,
            checkpoint_id: None,
        };
        self.updated_at = now;
    }

    pub fn complete(&mut self, files_processed: usize) {
        let now = Utc::now();
        let started_at = match &self.state {
            JobState::Running { started_at, .. } => *started_at,
            _ => now,
        };
        self.state = JobState::Completed {
            started_at,
            completed_at: now,
            duration_ms: (now - started_at).num_milliseconds().max(0) as u64,
            files_processed,
        };
        self.updated_at = now;
    }

    pub fn fail(&mut self, error: String, category: ErrorCategory, retry_count: u32) {
        let now = Utc::now();
        let started_at = match &self.state {
            JobState::Running { started_at, .. } => *started_at,
            _ => now,
        };
        let next_retry_at = match category {
            // Exponential backoff for transient failures
            ErrorCategory::Transient => {
                let backoff_secs = 2i64.saturating_pow(retry_count.min(8)) * 5;
                Some(now + chrono::Duration::seconds(backoff_secs))
            }
            _ => None,
        };
        self.state = JobState::Failed {
            started_at,
            failed_at: now,
            error,
            error_category: category,
            retry_count,
            next_retry_at,
        };
        self.updated_at = now;
    }

    pub fn cancel(&mut self, reason: String) {
        let now = Utc::now();
        self.state = JobState::Cancelled {
            cancelled_at: now,
            reason,
        };
        self.updated_at = now;
    }
}
