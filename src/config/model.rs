// src/config/model.rs

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dispatch::DispatcherOptions;
use crate::engine::SchedulerOptions;
use crate::model::BlueprintId;
use crate::process::ManagerOptions;

/// Configuration exactly as read from TOML.
///
/// ```toml
/// [manager]
/// lock_ttl = "3s"
/// admission_capacity = 128
///
/// [scheduler]
/// task_timeout = "10m"
///
/// [scheduler.timeouts]
/// "basic/evaluate" = "5s"
///
/// [dispatcher]
/// queue_capacity = 64
///
/// [server]
/// bind = "127.0.0.1:8080"
///
/// [store]
/// programs = "programs.json"
///
/// [[store.blueprint]]
/// id = 1
/// path = "blueprints/a+b.json"
/// ```
///
/// Every section is optional. Use [`ConfigFile::try_from`] to validate it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub manager: RawManagerSection,
    #[serde(default)]
    pub scheduler: RawSchedulerSection,
    #[serde(default)]
    pub dispatcher: RawDispatcherSection,
    #[serde(default)]
    pub server: RawServerSection,
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawManagerSection {
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl: String,
    #[serde(default = "default_admission_capacity")]
    pub admission_capacity: usize,
}

impl Default for RawManagerSection {
    fn default() -> Self {
        Self {
            lock_ttl: default_lock_ttl(),
            admission_capacity: default_admission_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSchedulerSection {
    #[serde(default = "default_task_timeout")]
    pub task_timeout: String,
    /// Per block-type bounded waits.
    #[serde(default)]
    pub timeouts: BTreeMap<String, String>,
}

impl Default for RawSchedulerSection {
    fn default() -> Self {
        Self {
            task_timeout: default_task_timeout(),
            timeouts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDispatcherSection {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RawDispatcherSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for RawServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Seed data for the in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StoreSection {
    /// JSON array of program schemas.
    #[serde(default)]
    pub programs: Option<PathBuf>,
    #[serde(default)]
    pub blueprint: Vec<BlueprintSource>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlueprintSource {
    pub id: BlueprintId,
    pub path: PathBuf,
    #[serde(default)]
    pub title: Option<String>,
}

impl StoreSection {
    /// Make relative paths relative to `base` (the config file's directory).
    pub fn resolve_relative_to(&mut self, base: &Path) {
        if let Some(p) = self.programs.as_mut() {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
        for bp in self.blueprint.iter_mut() {
            if bp.path.is_relative() {
                bp.path = base.join(&bp.path);
            }
        }
    }
}

fn default_lock_ttl() -> String {
    "3s".to_string()
}

fn default_admission_capacity() -> usize {
    128
}

fn default_task_timeout() -> String {
    "10m".to_string()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Validated configuration.
///
/// Only constructed through [`TryFrom<RawConfigFile>`] (see `validate.rs`)
/// or [`Default`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub manager: ManagerOptions,
    pub scheduler: SchedulerOptions,
    pub queue_capacity: usize,
    pub bind: SocketAddr,
    pub store: StoreSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        manager: ManagerOptions,
        scheduler: SchedulerOptions,
        queue_capacity: usize,
        bind: SocketAddr,
        store: StoreSection,
    ) -> Self {
        Self {
            manager,
            scheduler,
            queue_capacity,
            bind,
            store,
        }
    }

    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            queue_capacity: self.queue_capacity,
            scheduler: self.scheduler.clone(),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            manager: ManagerOptions::default(),
            scheduler: SchedulerOptions::default(),
            queue_capacity: default_queue_capacity(),
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            store: StoreSection::default(),
        }
    }
}
