// src/builtin/constant.rs

use serde_json::Value;

use super::{Handler, HandlerError, TaskContext};
use crate::model::Slot;

/// Emits property `value` as a `string` slot.
pub struct ConstString;

impl Handler for ConstString {
    fn name(&self) -> &'static str {
        "const_string"
    }

    fn is_matched(&self, kind: &str) -> bool {
        kind == "const_string" || kind == "basic/string"
    }

    fn work(&self, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let value = match ctx.property("value")? {
            Value::String(s) => s.clone(),
            Value::Null => {
                return Err(HandlerError::PropertyType {
                    key: "value",
                    expected: "a string",
                });
            }
            other => other.to_string(),
        };
        ctx.emit(Slot::string(value));
        Ok(())
    }
}

/// Emits property `value`, cast to an integer, as an `int` slot.
pub struct ConstInt;

impl Handler for ConstInt {
    fn name(&self) -> &'static str {
        "const_int"
    }

    fn is_matched(&self, kind: &str) -> bool {
        kind == "const_int"
    }

    fn work(&self, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let value = ctx.int_property("value")?;
        ctx.emit(Slot::int(value));
        Ok(())
    }
}
