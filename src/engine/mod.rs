// src/engine/mod.rs

//! Per-judgement execution engine.
//!
//! This module ties together:
//! - the blueprint graph and its result store
//! - the process manager, which runs or queues each ready block
//! - the verdict mapping applied once a run ends
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::dag::{Block, BlockId, GraphError, LinkId};
use crate::model::{JudgementId, Slots};
use crate::process::TaskError;

pub mod core;
pub mod event_handlers;
pub mod runtime;
pub mod verdict;

pub use self::core::ScheduleCore;
pub use event_handlers::CoreStep;
pub use runtime::Runtime;
pub use verdict::{apply_report, status_for_score};

/// Events flowing into the core from the runtime and its workers.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// The run begins; compute the first frontier.
    Started,
    /// A block's task produced outputs.
    BlockFinished { block: BlockId, outputs: Slots },
    /// A block's task failed (handler or actuator error).
    BlockFailed { block: BlockId, error: TaskError },
    /// Nobody finished the block's task within its bounded wait.
    BlockTimedOut { block: BlockId },
}

/// A block the shell should hand to the process manager.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub block: Block,
    pub inputs: Slots,
}

/// Structural failures that abort a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("block {block} has no value for input link {link}")]
    MissingSlot { block: BlockId, link: LinkId },

    #[error("block {block} produced {got} outputs but declares {expected}")]
    ArityMismatch {
        block: BlockId,
        expected: usize,
        got: usize,
    },

    #[error("block {block} failed: {error}")]
    TaskFailed { block: BlockId, error: TaskError },

    #[error("runtime event channel closed")]
    Interrupted,

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No block is pending any more. `abandoned` lists blocks whose task
    /// timed out (their descendants never ran).
    Completed { abandoned: Vec<BlockId> },
    Failed(RunError),
}

/// Result of one judgement run, handed back to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub judgement_id: JudgementId,
    /// Score as left on the judgement by `result` blocks.
    pub score: f64,
    pub outcome: RunOutcome,
}

/// Bounded waits per block.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Wait applied to block types without an override.
    pub task_timeout: Duration,
    /// Per block-type overrides.
    pub timeouts: HashMap<String, Duration>,
}

impl SchedulerOptions {
    pub fn timeout_for(&self, kind: &str) -> Duration {
        self.timeouts
            .get(kind)
            .copied()
            .unwrap_or(self.task_timeout)
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(10 * 60),
            timeouts: HashMap::new(),
        }
    }
}
