// src/model/mod.rs

//! Records exchanged between the engine and its collaborators.
//!
//! Everything here is plain data with serde derives; behaviour lives in the
//! engine, the dispatcher and the built-in handlers.

pub mod judgement;
pub mod records;
pub mod slot;

pub use judgement::{Args, JudgeStatus, Judgement, JudgementHandle, JudgementId, NO_SCORE};
pub use records::{
    Account, AccountId, Blueprint, BlueprintId, FieldAttr, Problem, ProblemId, Program,
    ProgramField, RankList, RankListId, RankListRecord, Submission, SubmissionId, Volume,
};
pub use slot::{Slot, Slots};
