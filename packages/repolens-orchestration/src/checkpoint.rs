//! Rebuild checkpoints
//!
//! A cancelled or failed session resumes from its last checkpoint instead
//! of restarting. Payloads are bincode; the in-memory manager backs tests
//! and single-process deployments.

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

/// Pipeline stage a checkpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageId {
    Parse,
    Generate,
    Resolve,
    Analyze,
    Index,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Parse => "parse",
            StageId::Generate => "generate",
            StageId::Resolve => "resolve",
            StageId::Analyze => "analyze",
            StageId::Index => "index",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub job_id: Uuid,
    pub stage: StageId,
    pub key: String,
    pub payload: Vec<u8>,
}

impl Checkpoint {
    pub fn new(job_id: Uuid, stage: StageId, key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            job_id,
            stage,
            key: key.into(),
            payload,
        }
    }

    /// Checkpoint a serializable value
    pub fn of<T: Serialize>(
        job_id: Uuid,
        stage: StageId,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        let payload = bincode::serialize(value)?;
        Ok(Self::new(job_id, stage, key, payload))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(bincode::deserialize(&self.payload)?)
    }
}

#[derive(Default)]
pub struct CheckpointManager {
    checkpoints: DashMap<(Uuid, String), Checkpoint>,
}

impl CheckpointManager {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    pub fn save(&self, checkpoint: Checkpoint) {
        self.checkpoints
            .insert((checkpoint.job_id, checkpoint.key.clone()), checkpoint);
    }

    pub fn load(&self, job_id: Uuid, key: &str) -> Result<Checkpoint> {
        self.checkpoints
            .get(&(job_id, key.to_string()))
            .map(|entry| entry.clone())
            .ok_or_else(|| OrchestratorError::CheckpointNotFound(key.to_string()))
    }

    pub fn has(&self, job_id: Uuid, key: &str) -> bool {
        self.checkpoints.contains_key(&(job_id, key.to_string()))
    }

    /// Drop a finished job's checkpoints
    pub fn clear_job(&self, job_id: Uuid) {
        self.checkpoints.retain(|(id, _), _| *id != job_id);
    }
}
