// src/store/memory.rs

//! In-memory implementation of every collaborator trait.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, anyhow, bail};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::{
    Account, AccountId, Args, Blueprint, BlueprintId, JudgeStatus, Judgement, JudgementId,
    Problem, ProblemId, Program, RankList, RankListId, RankListRecord, Submission, SubmissionId,
    Volume,
};
use crate::store::{
    AccountRepository, BlueprintRepository, JudgementRepository, ProblemRepository,
    ProgramRepository, RankListRepository, SubmissionRepository, Transition, VolumeService,
};

#[derive(Debug, Default)]
struct State {
    next_judgement: JudgementId,
    judgements: BTreeMap<JudgementId, Judgement>,
    blueprints: HashMap<BlueprintId, Blueprint>,
    programs: Vec<Program>,
    submissions: HashMap<SubmissionId, Submission>,
    problems: HashMap<ProblemId, Problem>,
    accounts: HashMap<AccountId, Account>,
    ranklists: HashMap<RankListId, RankList>,
    records: Vec<RankListRecord>,
    /// volume name -> (path -> contents)
    volumes: HashMap<String, BTreeMap<String, Vec<u8>>>,
}

/// Thread-safe store holding everything in a single mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_blueprint(&self, blueprint: Blueprint) {
        self.state.lock().blueprints.insert(blueprint.id, blueprint);
    }

    pub fn insert_program(&self, program: Program) {
        let mut state = self.state.lock();
        state.programs.retain(|p| p.name != program.name);
        state.programs.push(program);
    }

    pub fn insert_submission(&self, submission: Submission) {
        self.state.lock().submissions.insert(submission.id, submission);
    }

    pub fn insert_problem(&self, problem: Problem) {
        self.state.lock().problems.insert(problem.id, problem);
    }

    pub fn insert_account(&self, account: Account) {
        self.state.lock().accounts.insert(account.id, account);
    }

    pub fn insert_ranklist(&self, ranklist: RankList) {
        self.state.lock().ranklists.insert(ranklist.id, ranklist);
    }

    /// Store a judgement as-is (used to seed restored state).
    pub fn insert_judgement(&self, judgement: Judgement) {
        let mut state = self.state.lock();
        state.next_judgement = state.next_judgement.max(judgement.id);
        state.judgements.insert(judgement.id, judgement);
    }

    pub fn write_file(&self, volume: &str, path: &str, contents: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .volumes
            .entry(volume.to_string())
            .or_default()
            .insert(path.to_string(), contents.into());
    }

    pub fn read_file(&self, volume: &str, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .volumes
            .get(volume)
            .and_then(|files| files.get(path))
            .cloned()
    }

    pub fn volume_exists(&self, volume: &str) -> bool {
        self.state.lock().volumes.contains_key(volume)
    }
}

impl JudgementRepository for MemoryStore {
    fn create(&self, blueprint_id: BlueprintId, args: Args) -> Result<Judgement> {
        let mut state = self.state.lock();
        state.next_judgement += 1;
        let judgement = Judgement::new(state.next_judgement, blueprint_id, args);
        state.judgements.insert(judgement.id, judgement.clone());
        Ok(judgement)
    }

    fn get(&self, id: JudgementId) -> Result<Option<Judgement>> {
        Ok(self.state.lock().judgements.get(&id).cloned())
    }

    fn update(&self, judgement: &Judgement) -> Result<()> {
        let mut state = self.state.lock();
        let slot = state
            .judgements
            .get_mut(&judgement.id)
            .ok_or_else(|| anyhow!("judgement {} does not exist", judgement.id))?;
        if slot.status.is_terminal() && slot.status != judgement.status {
            bail!(
                "judgement {} is already {}; refusing to set {}",
                judgement.id,
                slot.status,
                judgement.status
            );
        }
        *slot = judgement.clone();
        Ok(())
    }

    fn update_if(
        &self,
        id: JudgementId,
        expected: JudgeStatus,
        change: &mut dyn FnMut(&mut Judgement),
    ) -> Result<Transition> {
        let mut state = self.state.lock();
        let Some(slot) = state.judgements.get_mut(&id) else {
            return Ok(Transition::Missing);
        };
        if slot.status != expected {
            return Ok(Transition::Stale(slot.clone()));
        }
        change(slot);
        Ok(Transition::Applied(slot.clone()))
    }

    fn pending(&self) -> Result<Vec<Judgement>> {
        Ok(self
            .state
            .lock()
            .judgements
            .values()
            .filter(|j| j.status == JudgeStatus::Pending)
            .cloned()
            .collect())
    }

    fn list_by_account(&self, account_id: AccountId) -> Result<Vec<Judgement>> {
        let state = self.state.lock();
        Ok(state
            .judgements
            .values()
            .filter(|j| {
                j.arg_id("submission")
                    .and_then(|sid| state.submissions.get(&sid))
                    .is_some_and(|s| s.submitter_id == account_id)
            })
            .cloned()
            .collect())
    }
}

impl BlueprintRepository for MemoryStore {
    fn get(&self, id: BlueprintId) -> Result<Option<Blueprint>> {
        Ok(self.state.lock().blueprints.get(&id).cloned())
    }
}

impl ProgramRepository for MemoryStore {
    fn list(&self) -> Result<Vec<Program>> {
        Ok(self.state.lock().programs.clone())
    }
}

impl SubmissionRepository for MemoryStore {
    fn get(&self, id: SubmissionId) -> Result<Option<Submission>> {
        Ok(self.state.lock().submissions.get(&id).cloned())
    }
}

impl ProblemRepository for MemoryStore {
    fn get(&self, id: ProblemId) -> Result<Option<Problem>> {
        Ok(self.state.lock().problems.get(&id).cloned())
    }
}

impl AccountRepository for MemoryStore {
    fn get(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.state.lock().accounts.get(&id).cloned())
    }
}

impl RankListRepository for MemoryStore {
    fn get(&self, id: RankListId) -> Result<Option<RankList>> {
        Ok(self.state.lock().ranklists.get(&id).cloned())
    }

    fn record(&self, record: RankListRecord) -> Result<()> {
        let mut state = self.state.lock();
        state.records.retain(|r| {
            !(r.ranklist_id == record.ranklist_id
                && r.account_id == record.account_id
                && r.key == record.key)
        });
        state.records.push(record);
        Ok(())
    }

    fn records(&self, id: RankListId) -> Result<Vec<RankListRecord>> {
        Ok(self
            .state
            .lock()
            .records
            .iter()
            .filter(|r| r.ranklist_id == id)
            .cloned()
            .collect())
    }
}

impl VolumeService for MemoryStore {
    fn create_volume(&self) -> Result<Volume> {
        let name = Uuid::new_v4().to_string();
        self.state.lock().volumes.insert(name.clone(), BTreeMap::new());
        Ok(Volume { name })
    }

    fn copy_file(
        &self,
        src_volume: &str,
        src_path: &str,
        dst_volume: &str,
        dst_path: &str,
    ) -> Result<Volume> {
        let mut state = self.state.lock();
        let contents = state
            .volumes
            .get(src_volume)
            .and_then(|files| files.get(src_path))
            .cloned()
            .ok_or_else(|| anyhow!("file '{src_path}' not found in volume '{src_volume}'"))?;
        let dst = state
            .volumes
            .get_mut(dst_volume)
            .ok_or_else(|| anyhow!("volume '{dst_volume}' does not exist"))?;
        dst.insert(dst_path.to_string(), contents);
        Ok(Volume {
            name: dst_volume.to_string(),
        })
    }
}
