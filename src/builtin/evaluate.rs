// src/builtin/evaluate.rs

use serde_json::Value;
use tracing::debug;

use super::cast::type_name;
use super::expr::evaluate;
use super::{Handler, HandlerError, TaskContext};
use crate::model::Slot;

/// Evaluates property `exp` against the resolved input values.
pub struct Evaluate;

impl Handler for Evaluate {
    fn name(&self) -> &'static str {
        "evaluate"
    }

    fn is_matched(&self, kind: &str) -> bool {
        kind == "basic/evaluate"
    }

    fn work(&self, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let exp = ctx.str_property("exp")?;
        let inputs: Vec<Value> = ctx.task.inputs.iter().map(|s| s.value.clone()).collect();

        let value = evaluate(exp, &inputs)?;
        debug!(task_id = %ctx.task.task_id, exp, result = %value, "expression evaluated");

        ctx.emit(Slot::new(type_name(&value), value));
        Ok(())
    }
}
