// src/store/mod.rs

//! Collaborator interfaces consumed by the engine.
//!
//! Persistence, volume storage and ranklists live outside the engine; it only
//! sees these traits. [`memory::MemoryStore`] implements all of them for the
//! CLI and for tests.

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;

use crate::model::{
    Account, AccountId, Args, Blueprint, BlueprintId, JudgeStatus, Judgement, JudgementId,
    Problem, ProblemId, Program, RankList, RankListId, RankListRecord, Submission, SubmissionId,
    Volume,
};

pub mod fixtures;
pub mod memory;

pub use memory::MemoryStore;

/// Outcome of [`JudgementRepository::update_if`].
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The status matched and the change was written.
    Applied(Judgement),
    /// The status had already moved on; the stored judgement is unchanged.
    Stale(Judgement),
    Missing,
}

pub trait JudgementRepository: Send + Sync + Debug {
    /// Persist a new `Pending` judgement with no score.
    fn create(&self, blueprint_id: BlueprintId, args: Args) -> Result<Judgement>;
    fn get(&self, id: JudgementId) -> Result<Option<Judgement>>;
    /// Overwrite status, score, message and args.
    ///
    /// A judgement in a terminal status cannot be moved to another status.
    fn update(&self, judgement: &Judgement) -> Result<()>;
    /// Apply `change` only while the stored status is `expected`.
    ///
    /// The check and the write are a single atomic step.
    fn update_if(
        &self,
        id: JudgementId,
        expected: JudgeStatus,
        change: &mut dyn FnMut(&mut Judgement),
    ) -> Result<Transition>;
    /// Judgements left `Pending`, oldest first.
    fn pending(&self) -> Result<Vec<Judgement>>;
    /// Judgements whose submission belongs to `account_id`.
    fn list_by_account(&self, account_id: AccountId) -> Result<Vec<Judgement>>;
}

pub trait BlueprintRepository: Send + Sync + Debug {
    fn get(&self, id: BlueprintId) -> Result<Option<Blueprint>>;
}

pub trait ProgramRepository: Send + Sync + Debug {
    fn list(&self) -> Result<Vec<Program>>;
}

pub trait SubmissionRepository: Send + Sync + Debug {
    fn get(&self, id: SubmissionId) -> Result<Option<Submission>>;
}

pub trait ProblemRepository: Send + Sync + Debug {
    fn get(&self, id: ProblemId) -> Result<Option<Problem>>;
}

pub trait AccountRepository: Send + Sync + Debug {
    fn get(&self, id: AccountId) -> Result<Option<Account>>;
}

pub trait RankListRepository: Send + Sync + Debug {
    fn get(&self, id: RankListId) -> Result<Option<RankList>>;
    /// Insert or replace the record keyed by (ranklist, account, key).
    fn record(&self, record: RankListRecord) -> Result<()>;
    fn records(&self, id: RankListId) -> Result<Vec<RankListRecord>>;
}

pub trait VolumeService: Send + Sync + Debug {
    fn create_volume(&self) -> Result<Volume>;

    /// Copy `src_path` out of `src_volume` into `dst_volume` as `dst_path`.
    ///
    /// Returns the volume now holding the file.
    fn copy_file(
        &self,
        src_volume: &str,
        src_path: &str,
        dst_volume: &str,
        dst_path: &str,
    ) -> Result<Volume>;
}

/// Every collaborator the engine needs, bundled for constructor injection.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub judgements: Arc<dyn JudgementRepository>,
    pub blueprints: Arc<dyn BlueprintRepository>,
    pub programs: Arc<dyn ProgramRepository>,
    pub submissions: Arc<dyn SubmissionRepository>,
    pub problems: Arc<dyn ProblemRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub ranklists: Arc<dyn RankListRepository>,
    pub volumes: Arc<dyn VolumeService>,
}

impl Repositories {
    /// Back every collaborator with the same in-memory store.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            judgements: store.clone(),
            blueprints: store.clone(),
            programs: store.clone(),
            submissions: store.clone(),
            problems: store.clone(),
            accounts: store.clone(),
            ranklists: store.clone(),
            volumes: store,
        }
    }
}
