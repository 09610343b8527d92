// src/builtin/mod.rs

//! Built-in handlers.
//!
//! A handler runs in-process, synchronously, as soon as a task is admitted
//! by the process manager. Handlers are tried in registration order and the
//! first one whose [`Handler::is_matched`] accepts the block type wins. Tasks
//! no handler claims go to the external queue.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::model::{JudgementHandle, Slot, Slots};
use crate::process::Task;
use crate::store::Repositories;

pub mod cast;
pub mod constant;
pub mod evaluate;
pub mod expr;
pub mod file;
pub mod ranklist;
pub mod result;
pub mod volume;

pub use expr::ExprError;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("missing property '{0}'")]
    MissingProperty(&'static str),

    #[error("property '{key}' must be {expected}")]
    PropertyType {
        key: &'static str,
        expected: &'static str,
    },

    #[error("missing input slot {0}")]
    MissingInput(usize),

    #[error("input slot {index} must be {expected}")]
    InputType {
        index: usize,
        expected: &'static str,
    },

    #[error("expression failed: {0}")]
    Expression(#[from] ExprError),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// What a handler sees while it runs.
///
/// `outputs` starts empty; the handler pushes one slot per declared output.
pub struct TaskContext<'a> {
    pub task: &'a Task,
    pub judgement: &'a JudgementHandle,
    pub outputs: Slots,
}

impl<'a> TaskContext<'a> {
    pub fn new(task: &'a Task, judgement: &'a JudgementHandle) -> Self {
        Self {
            task,
            judgement,
            outputs: Vec::new(),
        }
    }

    pub fn property(&self, key: &'static str) -> Result<&Value, HandlerError> {
        self.task
            .properties
            .get(key)
            .ok_or(HandlerError::MissingProperty(key))
    }

    pub fn str_property(&self, key: &'static str) -> Result<&str, HandlerError> {
        self.property(key)?
            .as_str()
            .ok_or(HandlerError::PropertyType {
                key,
                expected: "a string",
            })
    }

    pub fn int_property(&self, key: &'static str) -> Result<i64, HandlerError> {
        cast::to_i64(self.property(key)?).ok_or(HandlerError::PropertyType {
            key,
            expected: "an integer",
        })
    }

    pub fn input(&self, index: usize) -> Result<&Slot, HandlerError> {
        self.task
            .inputs
            .get(index)
            .ok_or(HandlerError::MissingInput(index))
    }

    pub fn str_input(&self, index: usize) -> Result<&str, HandlerError> {
        self.input(index)?.as_str().ok_or(HandlerError::InputType {
            index,
            expected: "a string",
        })
    }

    pub fn emit(&mut self, slot: Slot) {
        self.outputs.push(slot);
    }
}

/// An in-process block implementation.
pub trait Handler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn is_matched(&self, kind: &str) -> bool;

    fn work(&self, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError>;
}

/// Ordered list of handlers; first match wins.
#[derive(Default)]
pub struct Catalog {
    handlers: Vec<Box<dyn Handler>>,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("handlers", &self.names())
            .finish()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// The standard catalog, wired to the given collaborators.
    pub fn standard(repos: &Repositories) -> Self {
        Catalog::new()
            .with_handler(ranklist::RankListRecorder::new(
                repos.ranklists.clone(),
                repos.accounts.clone(),
            ))
            .with_handler(result::ResultCapture)
            .with_handler(constant::ConstString)
            .with_handler(constant::ConstInt)
            .with_handler(file::FileRef)
            .with_handler(evaluate::Evaluate)
            .with_handler(volume::VolumeCreate::persisting(
                repos.volumes.clone(),
                repos.judgements.clone(),
            ))
            .with_handler(volume::VolumeCreate::lazy(repos.volumes.clone()))
            .with_handler(volume::VolumeRead)
            .with_handler(volume::VolumeSave::new(repos.volumes.clone()))
    }

    pub fn find(&self, kind: &str) -> Option<&dyn Handler> {
        self.handlers
            .iter()
            .find(|h| h.is_matched(kind))
            .map(|h| h.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
