// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a config file without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load, validate, and resolve store paths against the file's directory.
///
/// This is the entry point the rest of the application uses.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    let mut config = ConfigFile::try_from(raw)?;

    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        config.store.resolve_relative_to(dir);
    }
    Ok(config)
}

/// `Judgedag.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Judgedag.toml")
}
