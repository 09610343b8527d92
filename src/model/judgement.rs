// src/model/judgement.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::BlueprintId;

pub type JudgementId = i64;

/// Free-form arguments attached to a judgement (`submission`, `problem`,
/// `volume`, ...).
pub type Args = BTreeMap<String, String>;

/// Score value meaning "no `result` block reported anything".
pub const NO_SCORE: f64 = -1.0;

/// Shared, mutable view of the judgement currently being executed.
///
/// The runtime owns one per run; built-in handlers write the score and
/// tracked volume through it.
pub type JudgementHandle = Arc<Mutex<Judgement>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JudgeStatus {
    Pending,
    Running,
    Canceled,
    Finished,
    PartiallyCorrect,
    WrongAnswer,
    Accepted,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    OutputLimitExceeded,
    RuntimeError,
    FileError,
    SystemError,
    JudgementFailed,
    CompilationError,
    ConfigurationError,
    InvalidInteraction,
}

impl JudgeStatus {
    /// Terminal states are never left again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JudgeStatus::Pending | JudgeStatus::Running)
    }
}

impl fmt::Display for JudgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Judgement {
    pub id: JudgementId,
    pub blueprint_id: BlueprintId,
    pub status: JudgeStatus,
    pub score: f64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub args: Args,
}

impl Judgement {
    /// A freshly created judgement: `Pending`, no score.
    pub fn new(id: JudgementId, blueprint_id: BlueprintId, args: Args) -> Self {
        Self {
            id,
            blueprint_id,
            status: JudgeStatus::Pending,
            score: NO_SCORE,
            msg: String::new(),
            args,
        }
    }

    /// Parse an integer argument, ignoring absent or blank values.
    pub fn arg_id(&self, key: &str) -> Option<i64> {
        self.args
            .get(key)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
    }

    pub fn into_handle(self) -> JudgementHandle {
        Arc::new(Mutex::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_judgement_is_pending_without_score() {
        let j = Judgement::new(7, 1, Args::new());
        assert_eq!(j.status, JudgeStatus::Pending);
        assert_eq!(j.score, NO_SCORE);
        assert!(!j.status.is_terminal());
    }

    #[test]
    fn arg_id_skips_blank_and_garbage() {
        let mut args = Args::new();
        args.insert("submission".into(), " 12 ".into());
        args.insert("problem".into(), "".into());
        args.insert("volume".into(), "abc".into());
        let j = Judgement::new(1, 1, args);

        assert_eq!(j.arg_id("submission"), Some(12));
        assert_eq!(j.arg_id("problem"), None);
        assert_eq!(j.arg_id("volume"), None);
        assert_eq!(j.arg_id("missing"), None);
    }
}
