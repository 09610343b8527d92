// src/cli.rs

//! CLI argument parsing using `clap`.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::errors::{JudgedagError, Result};
use crate::model;

/// Command-line arguments for `judgedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "judgedag",
    version,
    about = "Run judgement pipelines described as block DAGs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the engine config file (TOML).
    ///
    /// Defaults to `Judgedag.toml` when that file exists; built-in defaults
    /// are used otherwise.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JUDGEDAG_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Parse, substitute and validate a blueprint; print its blocks and links.
    Check(BlueprintArgs),

    /// Run one judgement against an in-memory store and print the result.
    Run(BlueprintArgs),

    /// Serve the task and judgement HTTP interface.
    Serve {
        /// Override `[server].bind`.
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct BlueprintArgs {
    /// Blueprint definition (JSON).
    #[arg(value_name = "BLUEPRINT")]
    pub blueprint: PathBuf,

    /// JSON array of program schemas.
    #[arg(long, value_name = "FILE")]
    pub programs: Option<PathBuf>,

    /// Judgement argument, repeatable (`--arg submission=3`).
    ///
    /// Arguments named after a template token (`--arg userVolume=v1`)
    /// also substitute that token.
    #[arg(long = "arg", value_name = "KEY=VALUE")]
    pub args: Vec<String>,
}

impl BlueprintArgs {
    pub fn judgement_args(&self) -> Result<model::Args> {
        parse_args(&self.args)
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

fn parse_args(pairs: &[String]) -> Result<model::Args> {
    let mut args = model::Args::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            JudgedagError::ConfigError(format!("--arg '{pair}' must look like KEY=VALUE"))
        })?;
        args.insert(key.trim().to_string(), value.to_string());
    }
    Ok(args)
}
