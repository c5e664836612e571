use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::QuestionnaireConfig;
use crate::flows::Answers;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("checkpoint `{0}` was not found")]
    NotFound(Uuid),
}

/// Named snapshot of the answers at a node, plus the questions skipped by then. The answer map
/// is owned, never shared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub name: String,
    pub node_id: String,
    pub created_at: DateTime<Utc>,
    pub answers: Answers,
    #[serde(default)]
    pub skipped: Vec<String>,
}

/// Keeps checkpoints in creation order and evicts the oldest beyond `max_checkpoints`.
#[derive(Clone, Debug)]
pub struct CheckpointManager {
    checkpoints: Vec<Checkpoint>,
    max_checkpoints: usize,
}

impl Default for CheckpointManager {
    fn default() -> Self {
        Self::from_config(&QuestionnaireConfig::default())
    }
}

impl CheckpointManager {
    pub fn new(max_checkpoints: usize) -> Self {
        Self { checkpoints: Vec::new(), max_checkpoints: max_checkpoints.max(1) }
    }

    pub fn from_config(config: &QuestionnaireConfig) -> Self {
        Self::new(config.max_checkpoints)
    }

    pub fn create(
        &mut self,
        node_id: impl Into<String>,
        name: impl Into<String>,
        answers: &Answers,
    ) -> &Checkpoint {
        self.create_with_skipped(node_id, name, answers, Vec::new())
    }

    pub fn create_with_skipped(
        &mut self,
        node_id: impl Into<String>,
        name: impl Into<String>,
        answers: &Answers,
        skipped: Vec<String>,
    ) -> &Checkpoint {
        if self.checkpoints.len() >= self.max_checkpoints {
            let overflow = self.checkpoints.len() + 1 - self.max_checkpoints;
            let evicted = self.checkpoints.drain(..overflow).count();
            tracing::debug!(
                event_name = "flows.checkpoint_evicted",
                evicted,
                max_checkpoints = self.max_checkpoints,
                "evicted oldest checkpoints"
            );
        }

        self.checkpoints.push(Checkpoint {
            id: Uuid::new_v4(),
            name: name.into(),
            node_id: node_id.into(),
            created_at: Utc::now(),
            answers: answers.clone(),
            skipped,
        });
        &self.checkpoints[self.checkpoints.len() - 1]
    }

    /// Returns a fresh copy of the snapshot; later edits to it never reach the checkpoint.
    pub fn restore(&self, id: Uuid) -> Result<Answers, CheckpointError> {
        self.get(id).map(|checkpoint| checkpoint.answers.clone()).ok_or(CheckpointError::NotFound(id))
    }

    pub fn latest(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    pub fn get(&self, id: Uuid) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|checkpoint| checkpoint.id == id)
    }

    pub fn list(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn delete(&mut self, id: Uuid) -> Result<Checkpoint, CheckpointError> {
        let index = self
            .checkpoints
            .iter()
            .position(|checkpoint| checkpoint.id == id)
            .ok_or(CheckpointError::NotFound(id))?;
        Ok(self.checkpoints.remove(index))
    }

    pub fn clear(&mut self) {
        self.checkpoints.clear();
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}
