// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Each subsystem owns a narrow error enum (`GraphError`, `ProcessError`,
//! `RunError`, ...). `JudgedagError` is what the binary surface and the
//! configuration layer return.

use thiserror::Error;

use crate::dag::{DefinitionError, GraphError};

#[derive(Error, Debug)]
pub enum JudgedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JudgedagError>;
