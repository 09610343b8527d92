// src/model/slot.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed value travelling along one link.
///
/// `kind` is a free-form tag (`"int"`, `"string"`, `"file"`, `"volume"`,
/// ...). The engine never interprets it; handlers and actuators agree on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

/// Ordered outputs (or resolved inputs) of one block.
pub type Slots = Vec<Slot>;

impl Slot {
    pub fn new(kind: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    pub fn int(value: i64) -> Self {
        Self::new("int", value)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new("string", value.into())
    }

    pub fn file(locator: impl Into<String>) -> Self {
        Self::new("file", locator.into())
    }

    pub fn volume(name: impl Into<String>) -> Self {
        Self::new("volume", name.into())
    }

    /// The value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}
