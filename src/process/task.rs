// src/process/task.rs

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dag::{Block, BlockId, Properties};
use crate::model::{JudgementId, Slots};

pub type TaskId = String;

/// A block instantiated for execution, with its inputs resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: TaskId,
    pub judgement_id: JudgementId,
    pub block_id: BlockId,
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: Properties,
    pub inputs: Slots,
    #[serde(default)]
    pub outputs: Slots,
}

impl Task {
    pub fn from_block(
        task_id: TaskId,
        judgement_id: JudgementId,
        block: &Block,
        inputs: Slots,
    ) -> Self {
        Self {
            task_id,
            judgement_id,
            block_id: block.id,
            kind: block.kind.clone(),
            properties: block.properties.clone(),
            inputs,
            outputs: Vec::new(),
        }
    }
}

/// Why a task did not produce outputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// A built-in handler failed.
    #[error("{handler}: {message}")]
    Handler {
        handler: &'static str,
        message: String,
    },

    /// An external actuator reported an error.
    #[error("{0}")]
    Actuator(String),

    /// The task left the queue without a result (purged or manager stopped).
    #[error("task dropped before completion")]
    Dropped,
}

pub type TaskResult = Result<Slots, TaskError>;

/// Lightweight view of a queued task for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub judgement_id: JudgementId,
    pub block_id: BlockId,
    #[serde(rename = "type")]
    pub kind: String,
    pub locked: bool,
}
