// src/builtin/result.rs

use tracing::info;

use super::cast::to_f64;
use super::{Handler, HandlerError, TaskContext};

/// Stores input 0, cast to a number, as the judgement score.
///
/// Values that do not cast are stored as NaN and rejected when the verdict
/// is derived.
pub struct ResultCapture;

impl Handler for ResultCapture {
    fn name(&self) -> &'static str {
        "result"
    }

    fn is_matched(&self, kind: &str) -> bool {
        kind == "result"
    }

    fn work(&self, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let score = to_f64(&ctx.input(0)?.value);

        let mut judgement = ctx.judgement.lock();
        judgement.score = score;
        info!(judgement_id = judgement.id, score, "score captured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::builtin::test_support::{judgement, task};
    use crate::model::Slot;

    #[test]
    fn stores_score_on_judgement() {
        let t = task("result", json!({}), vec![Slot::string("87.5")]);
        let j = judgement();
        let mut ctx = TaskContext::new(&t, &j);
        ResultCapture.work(&mut ctx).unwrap();
        assert!(ctx.outputs.is_empty());
        assert_eq!(j.lock().score, 87.5);
    }

    #[test]
    fn uncastable_score_is_nan() {
        let t = task("result", json!({}), vec![Slot::new("bool", true)]);
        let j = judgement();
        let mut ctx = TaskContext::new(&t, &j);
        ResultCapture.work(&mut ctx).unwrap();
        assert!(j.lock().score.is_nan());
    }

    #[test]
    fn missing_input_is_an_error() {
        let t = task("result", json!({}), vec![]);
        let j = judgement();
        let mut ctx = TaskContext::new(&t, &j);
        assert!(matches!(
            ResultCapture.work(&mut ctx),
            Err(HandlerError::MissingInput(0))
        ));
    }
}
