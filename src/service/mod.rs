// src/service/mod.rs

//! Transport-independent operations behind the HTTP interface.

use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::process::ProcessError;

pub mod judgement;
pub mod task;

pub use judgement::{CreateJudgement, JudgementService};
pub use task::{TaskService, UpdateTask};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    /// The request conflicts with current lock state (already reserved).
    #[error("{0}")]
    Precondition(String),

    /// The caller's reservation is no longer the current one.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ProcessError> for ServiceError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::NotFound(_) => ServiceError::NotFound(err.to_string()),
            ProcessError::AlreadyReserved(_) => ServiceError::Precondition(err.to_string()),
            ProcessError::StaleReservation(_) => ServiceError::Conflict(err.to_string()),
        }
    }
}

impl From<DispatchError> for ServiceError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NotFound(_) | DispatchError::BlueprintNotFound(_) => {
                ServiceError::NotFound(err.to_string())
            }
            DispatchError::AlreadyProcessing(_) | DispatchError::NotPending { .. } => {
                ServiceError::Conflict(err.to_string())
            }
            DispatchError::Definition(_) => ServiceError::BadRequest(err.to_string()),
            DispatchError::Stopped => ServiceError::Internal(anyhow::anyhow!(err.to_string())),
            DispatchError::Backend(inner) => ServiceError::Internal(inner),
        }
    }
}
