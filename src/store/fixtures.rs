// src/store/fixtures.rs

//! Seeding a [`MemoryStore`] from files on disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::StoreSection;
use crate::model::{Blueprint, BlueprintId, Program};
use crate::store::MemoryStore;

/// Read a JSON array of program schemas.
pub fn load_programs(path: impl AsRef<Path>) -> Result<Vec<Program>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading programs file at {:?}", path))?;
    let programs: Vec<Program> = serde_json::from_str(&text)
        .with_context(|| format!("parsing programs JSON from {:?}", path))?;
    Ok(programs)
}

/// Read a blueprint definition verbatim. The title defaults to the file stem.
pub fn load_blueprint(
    id: BlueprintId,
    path: impl AsRef<Path>,
    title: Option<String>,
) -> Result<Blueprint> {
    let path = path.as_ref();
    let definition = fs::read_to_string(path)
        .with_context(|| format!("reading blueprint {id} at {:?}", path))?;
    let title = title.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    Ok(Blueprint {
        id,
        title,
        definition,
    })
}

/// Load everything `section` names into `store`.
pub fn seed(store: &MemoryStore, section: &StoreSection) -> Result<()> {
    if let Some(path) = &section.programs {
        let programs = load_programs(path)?;
        info!(count = programs.len(), path = ?path, "programs loaded");
        for program in programs {
            store.insert_program(program);
        }
    }

    for source in section.blueprint.iter() {
        let blueprint = load_blueprint(source.id, &source.path, source.title.clone())?;
        info!(blueprint_id = blueprint.id, title = %blueprint.title, "blueprint loaded");
        store.insert_blueprint(blueprint);
    }
    Ok(())
}
