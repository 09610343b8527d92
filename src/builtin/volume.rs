// src/builtin/volume.rs

//! Volume handlers: lazy creation, pass-through reads and file copies.

use std::sync::Arc;

use tracing::{debug, info};

use super::{Handler, HandlerError, TaskContext};
use crate::model::Slot;
use crate::store::{JudgementRepository, VolumeService};

/// Judgement argument holding the volume tracked for the run.
pub const VOLUME_ARG: &str = "volume";

/// Emits the judgement's working volume, creating it on first use.
///
/// The `volume_create` variant persists the judgement right away so the
/// chosen volume survives a crash; plain `volume` leaves that to the final
/// status update.
pub struct VolumeCreate {
    volumes: Arc<dyn VolumeService>,
    judgements: Option<Arc<dyn JudgementRepository>>,
}

impl VolumeCreate {
    pub fn persisting(
        volumes: Arc<dyn VolumeService>,
        judgements: Arc<dyn JudgementRepository>,
    ) -> Self {
        Self {
            volumes,
            judgements: Some(judgements),
        }
    }

    pub fn lazy(volumes: Arc<dyn VolumeService>) -> Self {
        Self {
            volumes,
            judgements: None,
        }
    }
}

impl Handler for VolumeCreate {
    fn name(&self) -> &'static str {
        if self.judgements.is_some() {
            "volume_create"
        } else {
            "volume"
        }
    }

    fn is_matched(&self, kind: &str) -> bool {
        kind == self.name()
    }

    fn work(&self, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let existing = ctx
            .judgement
            .lock()
            .args
            .get(VOLUME_ARG)
            .filter(|v| !v.is_empty())
            .cloned();

        let name = match existing {
            Some(name) => name,
            None => {
                let volume = self.volumes.create_volume()?;
                let snapshot = {
                    let mut judgement = ctx.judgement.lock();
                    judgement
                        .args
                        .insert(VOLUME_ARG.to_string(), volume.name.clone());
                    judgement.clone()
                };
                info!(judgement_id = snapshot.id, volume = %volume.name, "volume created");
                if let Some(repo) = &self.judgements {
                    repo.update(&snapshot)?;
                }
                volume.name
            }
        };

        ctx.emit(Slot::volume(name));
        Ok(())
    }
}

/// Passes input 0 through as a `file` slot.
pub struct VolumeRead;

impl Handler for VolumeRead {
    fn name(&self) -> &'static str {
        "volume_read"
    }

    fn is_matched(&self, kind: &str) -> bool {
        kind == "volume_read"
    }

    fn work(&self, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let value = ctx.input(0)?.value.clone();
        ctx.emit(Slot::new("file", value));
        Ok(())
    }
}

/// Copies `srcVolume/path` (input 1) into the volume given by input 0 under
/// property `filename`, then tracks the destination volume on the judgement.
pub struct VolumeSave {
    volumes: Arc<dyn VolumeService>,
}

impl VolumeSave {
    pub fn new(volumes: Arc<dyn VolumeService>) -> Self {
        Self { volumes }
    }
}

impl Handler for VolumeSave {
    fn name(&self) -> &'static str {
        "volume_save"
    }

    fn is_matched(&self, kind: &str) -> bool {
        kind == "volume_save"
    }

    fn work(&self, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let target = ctx.str_input(0)?;
        let source = ctx.str_input(1)?;
        let filename = ctx.str_property("filename")?;

        let (src_volume, src_path) =
            source
                .split_once('/')
                .ok_or(HandlerError::InputType {
                    index: 1,
                    expected: "a 'volume/path' locator",
                })?;

        debug!(
            task_id = %ctx.task.task_id,
            src_volume,
            src_path,
            target,
            filename,
            "copying file between volumes"
        );
        let volume = self
            .volumes
            .copy_file(src_volume, src_path, target, filename)?;

        ctx.judgement
            .lock()
            .args
            .insert(VOLUME_ARG.to_string(), volume.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::builtin::test_support::{judgement, task};
    use crate::model::Args;
    use crate::store::MemoryStore;

    #[test]
    fn volume_create_is_lazy_and_persisted() {
        let store = Arc::new(MemoryStore::new());
        let created = JudgementRepository::create(store.as_ref(), 1, Args::new()).unwrap();
        let j = created.into_handle();
        let handler = VolumeCreate::persisting(store.clone(), store.clone());

        let t = task("volume_create", json!({}), vec![]);
        let mut ctx = TaskContext::new(&t, &j);
        handler.work(&mut ctx).unwrap();
        let first = ctx.outputs[0].as_str().unwrap().to_string();
        assert!(store.volume_exists(&first));

        let persisted = JudgementRepository::get(store.as_ref(), 1).unwrap().unwrap();
        assert_eq!(persisted.args.get(VOLUME_ARG), Some(&first));

        let mut ctx = TaskContext::new(&t, &j);
        handler.work(&mut ctx).unwrap();
        assert_eq!(ctx.outputs, vec![Slot::volume(first)]);
    }

    #[test]
    fn volume_read_passes_through() {
        let t = task("volume_read", json!({}), vec![Slot::volume("v/a.out")]);
        let j = judgement();
        let mut ctx = TaskContext::new(&t, &j);
        VolumeRead.work(&mut ctx).unwrap();
        assert_eq!(ctx.outputs, vec![Slot::file("v/a.out")]);
    }

    #[test]
    fn volume_save_copies_and_tracks_destination() {
        let store = Arc::new(MemoryStore::new());
        store.write_file("build", "bin/a.out", "ELF");
        let dst = VolumeService::create_volume(store.as_ref()).unwrap();

        let t = task(
            "volume_save",
            json!({"filename": "answer"}),
            vec![Slot::volume(dst.name.clone()), Slot::file("build/bin/a.out")],
        );
        let j = judgement();
        let mut ctx = TaskContext::new(&t, &j);
        VolumeSave::new(store.clone()).work(&mut ctx).unwrap();

        assert!(ctx.outputs.is_empty());
        assert_eq!(store.read_file(&dst.name, "answer").unwrap(), b"ELF");
        assert_eq!(j.lock().args.get(VOLUME_ARG), Some(&dst.name));
    }

    #[test]
    fn volume_save_needs_a_locator() {
        let store = Arc::new(MemoryStore::new());
        let t = task(
            "volume_save",
            json!({"filename": "answer"}),
            vec![Slot::volume("v"), Slot::file("no-slash")],
        );
        let j = judgement();
        let mut ctx = TaskContext::new(&t, &j);
        assert!(matches!(
            VolumeSave::new(store).work(&mut ctx),
            Err(HandlerError::InputType { index: 1, .. })
        ));
    }
}
