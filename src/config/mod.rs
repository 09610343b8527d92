// src/config/mod.rs

//! Engine configuration.
//!
//! - [`model`] is the TOML data model, raw and validated.
//! - [`loader`] reads a file from disk.
//! - [`validate`] turns a [`RawConfigFile`] into a [`ConfigFile`].
//! - [`duration`] parses `"3s"`-style durations.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{BlueprintSource, ConfigFile, RawConfigFile, StoreSection};
