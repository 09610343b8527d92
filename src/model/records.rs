// src/model/records.rs

//! Read-mostly records owned by collaborators (CRUD lives elsewhere).

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type AccountId = i64;
pub type BlueprintId = i64;
pub type ProblemId = i64;
pub type RankListId = i64;
pub type SubmissionId = i64;

/// A DAG definition. `definition` is the raw JSON text, template tokens
/// included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub id: BlueprintId,
    #[serde(default)]
    pub title: String,
    pub definition: String,
}

/// Whether a schema field is consumed or produced by the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldAttr {
    Input,
    Output,
    #[serde(other)]
    Property,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramField {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub attr: FieldAttr,
}

/// A reusable block schema. `name` is the block type it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fields: Vec<ProgramField>,
}

impl Program {
    pub fn input_arity(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.attr == FieldAttr::Input)
            .count()
    }

    pub fn output_arity(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.attr == FieldAttr::Output)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: ProblemId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub public_volume: String,
    #[serde(default)]
    pub private_volume: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    #[serde(default)]
    pub name: String,
    pub submitter_id: AccountId,
    #[serde(default)]
    pub problem_id: Option<ProblemId>,
    #[serde(default)]
    pub user_volume: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankList {
    pub id: RankListId,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankListRecord {
    pub ranklist_id: RankListId,
    pub account_id: AccountId,
    pub key: String,
    pub value: Value,
}
