// src/builtin/ranklist.rs

use std::sync::Arc;

use tracing::info;

use super::{Handler, HandlerError, TaskContext};
use crate::model::RankListRecord;
use crate::store::{AccountRepository, RankListRepository};

/// Records input 0 under (`ranklistID`, `accountID`, `metric_key`).
pub struct RankListRecorder {
    ranklists: Arc<dyn RankListRepository>,
    accounts: Arc<dyn AccountRepository>,
}

impl RankListRecorder {
    pub fn new(
        ranklists: Arc<dyn RankListRepository>,
        accounts: Arc<dyn AccountRepository>,
    ) -> Self {
        Self {
            ranklists,
            accounts,
        }
    }
}

impl Handler for RankListRecorder {
    fn name(&self) -> &'static str {
        "ranklist"
    }

    fn is_matched(&self, kind: &str) -> bool {
        kind == "ranklist"
    }

    fn work(&self, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
        let ranklist_id = ctx.int_property("ranklistID")?;
        let account_id = ctx.int_property("accountID")?;
        let key = ctx.str_property("metric_key")?.to_string();
        let value = ctx.input(0)?.value.clone();

        if self.ranklists.get(ranklist_id)?.is_none() {
            return Err(HandlerError::NotFound(format!("ranklist {ranklist_id}")));
        }
        if self.accounts.get(account_id)?.is_none() {
            return Err(HandlerError::NotFound(format!("account {account_id}")));
        }

        info!(
            task_id = %ctx.task.task_id,
            ranklist_id,
            account_id,
            key = %key,
            "recording ranklist metric"
        );
        self.ranklists.record(RankListRecord {
            ranklist_id,
            account_id,
            key,
            value,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::builtin::test_support::{judgement, task};
    use crate::model::{Account, RankList, Slot};
    use crate::store::MemoryStore;

    fn recorder(store: &Arc<MemoryStore>) -> RankListRecorder {
        RankListRecorder::new(store.clone(), store.clone())
    }

    #[test]
    fn records_metric() {
        let store = Arc::new(MemoryStore::new());
        store.insert_ranklist(RankList { id: 3, title: "r".into() });
        store.insert_account(Account { id: 9, nickname: "n".into() });

        let t = task(
            "ranklist",
            json!({"ranklistID": 3, "accountID": "9", "metric_key": "score"}),
            vec![Slot::new("number", 75)],
        );
        let j = judgement();
        let mut ctx = TaskContext::new(&t, &j);
        recorder(&store).work(&mut ctx).unwrap();

        let records = RankListRepository::records(store.as_ref(), 3).unwrap();
        assert_eq!(
            records,
            vec![RankListRecord {
                ranklist_id: 3,
                account_id: 9,
                key: "score".into(),
                value: json!(75),
            }]
        );
    }

    #[test]
    fn unknown_ranklist_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        store.insert_account(Account { id: 9, nickname: "n".into() });

        let t = task(
            "ranklist",
            json!({"ranklistID": 3, "accountID": 9, "metric_key": "score"}),
            vec![Slot::int(1)],
        );
        let j = judgement();
        let mut ctx = TaskContext::new(&t, &j);
        assert!(matches!(
            recorder(&store).work(&mut ctx),
            Err(HandlerError::NotFound(_))
        ));
    }
}
