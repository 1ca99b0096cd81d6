//! Rebuild locking
//!
//! One rebuilder per (repo, snapshot): the repo-snapshot lock has a TTL
//! with auto-extension for long builds, and contention resolves to
//! Deduped / Superseded / Queued. File-level locks let workers parallelize
//! across files while a given file stays single-writer. Guards release on
//! drop, so every exit path (including panics) unlocks.

use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::job::SubmitOutcome;

#[derive(Debug, Clone)]
struct LockEntry {
    holder: Uuid,
    priority: i32,
    expires_at: DateTime<Utc>,
}

/// Single-writer lock per (repo_id, snapshot_id)
pub struct RepoSnapshotLock {
    entries: Arc<DashMap<(String, String), LockEntry>>,
    ttl: Duration,
}

impl RepoSnapshotLock {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Default TTL of 5 minutes, extended every 60 s by active holders
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::minutes(5))
    }

    /// Try to acquire. An expired holder is replaced; a live holder on the
    /// same target dedupes lower-or-equal priority and supersedes lower
    /// priority requests.
    pub fn acquire(
        &self,
        repo_id: &str,
        snapshot_id: &str,
        job_id: Uuid,
        priority: i32,
    ) -> (SubmitOutcome, Option<RepoLockGuard>) {
        let key = (repo_id.to_string(), snapshot_id.to_string());
        let now = Utc::now();

        let mut outcome = None;
        let entry = self.entries.entry(key.clone());
        let entry = entry
            .and_modify(|existing| {
                if existing.expires_at < now {
                    // Expired holder: take over
                    *existing = LockEntry {
                        holder: job_id,
                        priority,
                        expires_at: now + self.ttl,
                    };
                } else if priority > existing.priority {
                    outcome = Some(SubmitOutcome::Superseded {
                        superseded: existing.holder,
                    });
                    *existing = LockEntry {
                        holder: job_id,
                        priority,
                        expires_at: now + self.ttl,
                    };
                } else {
                    outcome = Some(SubmitOutcome::Deduped {
                        holder: existing.holder,
                    });
                }
            })
            .or_insert_with(|| LockEntry {
                holder: job_id,
                priority,
                expires_at: now + self.ttl,
            });
        let holds_lock = entry.holder == job_id;
        drop(entry);

        match outcome {
            Some(SubmitOutcome::Deduped { holder }) => {
                (SubmitOutcome::Deduped { holder }, None)
            }
            Some(SubmitOutcome::Superseded { superseded }) => (
                SubmitOutcome::Superseded { superseded },
                Some(RepoLockGuard {
                    entries: Arc::clone(&self.entries),
                    key,
                    holder: job_id,
                }),
            ),
            _ if holds_lock => (
                SubmitOutcome::Accepted,
                Some(RepoLockGuard {
                    entries: Arc::clone(&self.entries),
                    key,
                    holder: job_id,
                }),
            ),
            _ => (SubmitOutcome::Queued, None),
        }
    }

    /// Auto-extend (called every ~60 s during long builds)
    pub fn extend(&self, repo_id: &str, snapshot_id: &str, job_id: Uuid) -> bool {
        let key = (repo_id.to_string(), snapshot_id.to_string());
        match self.entries.get_mut(&key) {
            Some(mut entry) if entry.holder == job_id => {
                entry.expires_at = Utc::now() + self.ttl;
                true
            }
            _ => false,
        }
    }

    pub fn is_held(&self, repo_id: &str, snapshot_id: &str) -> bool {
        let key = (repo_id.to_string(), snapshot_id.to_string());
        self.entries
            .get(&key)
            .map(|entry| entry.expires_at >= Utc::now())
            .unwrap_or(false)
    }
}

/// Releases the repo-snapshot lock on drop (success, failure, or panic)
pub struct RepoLockGuard {
    entries: Arc<DashMap<(String, String), LockEntry>>,
    key: (String, String),
    holder: Uuid,
}

impl Drop for RepoLockGuard {
    fn drop(&mut self) {
        self.entries
            .remove_if(&self.key, |_, entry| entry.holder == self.holder);
    }
}

/// File-level locks within an active rebuild session
#[derive(Default)]
pub struct FileLockSet {
    locked: Arc<DashSet<String>>,
}

impl FileLockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a file for processing; None when another worker holds it
    pub fn try_lock(&self, file_path: &str) -> Option<FileLockGuard> {
        if self.locked.insert(file_path.to_string()) {
            Some(FileLockGuard {
                locked: Arc::clone(&self.locked),
                file_path: file_path.to_string(),
            })
        } else {
            None
        }
    }
}

pub struct FileLockGuard {
    locked: Arc<DashSet<String>>,
    file_path: String,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        self.locked.remove(&self.file_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release_on_drop() {
        let lock = RepoSnapshotLock::with_default_ttl();
        let job = Uuid::new_v4();
        {
            let (outcome, guard) = lock.acquire("repo", "s1", job, 0);
            assert_eq!(outcome, SubmitOutcome::Accepted);
            assert!(guard.is_some());
            assert!(lock.is_held("repo", "s1"));
        }
        // Guard dropped
        assert!(!lock.is_held("repo", "s1"));
    }

    #[test]
    fn test_same_target_dedupes() {
        let lock = RepoSnapshotLock::with_default_ttl();
        let first = Uuid::new_v4();
        let (_, _guard) = lock.acquire("repo", "s1", first, 0);

        let second = Uuid::new_v4();
        let (outcome, guard) = lock.acquire("repo", "s1", second, 0);
        assert_eq!(outcome, SubmitOutcome::Deduped { holder: first });
        assert!(guard.is_none());
    }

    #[test]
    fn test_higher_priority_supersedes() {
        let lock = RepoSnapshotLock::with_default_ttl();
        let first = Uuid::new_v4();
        let (_, first_guard) = lock.acquire("repo", "s1", first, 0);

        let urgent = Uuid::new_v4();
        let (outcome, guard) = lock.acquire("repo", "s1", urgent, 10);
        assert_eq!(outcome, SubmitOutcome::Superseded { superseded: first });
        assert!(guard.is_some());

        // The superseded holder's guard must not release the new holder
        drop(first_guard);
        assert!(lock.is_held("repo", "s1"));
    }

    #[test]
    fn test_different_snapshots_do_not_contend() {
        let lock = RepoSnapshotLock::with_default_ttl();
        let (a, _ga) = lock.acquire("repo", "s1", Uuid::new_v4(), 0);
        let (b, _gb) = lock.acquire("repo", "s2", Uuid::new_v4(), 0);
        assert_eq!(a, SubmitOutcome::Accepted);
        assert_eq!(b, SubmitOutcome::Accepted);
    }

    #[test]
    fn test_extend_only_for_holder() {
        let lock = RepoSnapshotLock::with_default_ttl();
        let holder = Uuid::new_v4();
        let (_, _guard) = lock.acquire("repo", "s1", holder, 0);
        assert!(lock.extend("repo", "s1", holder));
        assert!(!lock.extend("repo", "s1", Uuid::new_v4()));
    }

    #[test]
    fn test_file_locks_are_exclusive() {
        let files = FileLockSet::new();
        let guard = files.try_lock("a.py");
        assert!(guard.is_some());
        assert!(files.try_lock("a.py").is_none());
        assert!(files.try_lock("b.py").is_some());

        drop(guard);
        assert!(files.try_lock("a.py").is_some());
    }
}
