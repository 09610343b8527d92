// src/builtin/file.rs

use super::{Handler, HandlerError, TaskContext};
use crate::model::Slot;

/// Emits property `url` as a `file` slot.
pub struct FileRef;

impl Handler for FileRef {
    fn name(&self) -> &'static str {
        "file"
    }

    fn is_matched(&self, kind: &str) -> bool {
        kind == "basic/file"
    }

    fn work(&self, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let url = ctx.str_property("url")?.to_string();
        ctx.emit(Slot::file(url));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::builtin::test_support::{judgement, task};

    #[test]
    fn emits_url() {
        let t = task("basic/file", json!({"url": "vol/x.txt"}), vec![]);
        let j = judgement();
        let mut ctx = TaskContext::new(&t, &j);
        FileRef.work(&mut ctx).unwrap();
        assert_eq!(ctx.outputs, vec![Slot::file("vol/x.txt")]);
    }

    #[test]
    fn url_must_be_a_string() {
        let t = task("basic/file", json!({"url": 3}), vec![]);
        let j = judgement();
        let mut ctx = TaskContext::new(&t, &j);
        assert!(matches!(
            FileRef.work(&mut ctx),
            Err(HandlerError::PropertyType { key: "url", .. })
        ));
    }
}
