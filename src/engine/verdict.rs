// src/engine/verdict.rs

//! Mapping from a finished run to the judgement's final state.

use crate::engine::{RunOutcome, RunReport};
use crate::model::{JudgeStatus, Judgement, NO_SCORE};

/// Status for a score left by `result` blocks.
///
/// `-1` means no score was reported. Anything outside `[0, 100]` (or NaN) is
/// a system error.
pub fn status_for_score(score: f64) -> JudgeStatus {
    if score == NO_SCORE {
        JudgeStatus::Finished
    } else if score == 0.0 {
        JudgeStatus::WrongAnswer
    } else if score == 100.0 {
        JudgeStatus::Accepted
    } else if score > 0.0 && score < 100.0 {
        JudgeStatus::PartiallyCorrect
    } else {
        JudgeStatus::SystemError
    }
}

/// Write the final status, score and message onto the judgement.
pub fn apply_report(judgement: &mut Judgement, report: &RunReport) {
    match &report.outcome {
        RunOutcome::Completed { .. } => {
            let status = status_for_score(report.score);
            judgement.status = status;
            if status == JudgeStatus::SystemError {
                judgement.msg = format!("invalid score {}", report.score);
                judgement.score = NO_SCORE;
            } else {
                judgement.score = report.score;
            }
        }
        RunOutcome::Failed(err) => {
            judgement.status = JudgeStatus::SystemError;
            judgement.score = NO_SCORE;
            judgement.msg = err.to_string();
        }
    }
}
