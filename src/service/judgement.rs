// src/service/judgement.rs

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dispatch::DispatcherHandle;
use crate::model::{AccountId, Args, BlueprintId, JudgeStatus, Judgement, JudgementId, NO_SCORE};
use crate::service::ServiceError;
use crate::store::{Repositories, Transition};

/// Body of `POST /judgements`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJudgement {
    pub blueprint_id: BlueprintId,
    #[serde(default)]
    pub args: Args,
}

#[derive(Debug, Clone)]
pub struct JudgementService {
    repos: Repositories,
    dispatcher: DispatcherHandle,
}

impl JudgementService {
    pub fn new(repos: Repositories, dispatcher: DispatcherHandle) -> Self {
        Self { repos, dispatcher }
    }

    /// Persist a new judgement and start running it.
    ///
    /// The returned judgement is already `Running` unless its definition was
    /// rejected, which is reported as `BadRequest`.
    pub async fn create_judgement(&self, req: CreateJudgement) -> Result<Judgement, ServiceError> {
        if self.repos.blueprints.get(req.blueprint_id)?.is_none() {
            return Err(ServiceError::NotFound(format!(
                "blueprint {} not found",
                req.blueprint_id
            )));
        }

        let judgement = self.repos.judgements.create(req.blueprint_id, req.args)?;
        info!(
            judgement_id = judgement.id,
            blueprint_id = judgement.blueprint_id,
            "judgement created"
        );

        self.dispatcher.submit(judgement.id).await?;
        self.get_judgement(judgement.id)
    }

    pub fn get_judgement(&self, id: JudgementId) -> Result<Judgement, ServiceError> {
        self.repos
            .judgements
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("judgement {id} not found")))
    }

    pub fn list_judgements(&self, account_id: AccountId) -> Result<Vec<Judgement>, ServiceError> {
        Ok(self.repos.judgements.list_by_account(account_id)?)
    }

    /// Cancel a judgement that has not started yet.
    ///
    /// Races with the dispatcher starting the same judgement; exactly one of
    /// the two moves it out of `Pending`.
    pub fn cancel_judgement(&self, id: JudgementId) -> Result<Judgement, ServiceError> {
        let outcome = self
            .repos
            .judgements
            .update_if(id, JudgeStatus::Pending, &mut |j: &mut Judgement| {
                j.status = JudgeStatus::Canceled;
                j.score = NO_SCORE;
                j.msg = "User cancel".into();
            })?;

        match outcome {
            Transition::Applied(judgement) => {
                info!(judgement_id = id, "judgement canceled");
                Ok(judgement)
            }
            Transition::Stale(current) => Err(ServiceError::Forbidden(format!(
                "judgement {id} is {}; only pending judgements can be canceled",
                current.status
            ))),
            Transition::Missing => Err(ServiceError::NotFound(format!("judgement {id} not found"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::builtin::Catalog;
    use crate::dispatch::{Dispatcher, DispatcherOptions};
    use crate::model::{Blueprint, Submission};
    use crate::process::{ManagerOptions, ProcessManager};
    use crate::store::MemoryStore;

    fn service() -> (Arc<MemoryStore>, JudgementService) {
        let store = Arc::new(MemoryStore::new());
        let repos = Repositories::memory(store.clone());
        let manager = ProcessManager::new(Catalog::standard(&repos), ManagerOptions::default());
        let dispatcher = Dispatcher::spawn(repos.clone(), manager, DispatcherOptions::default());
        (store, JudgementService::new(repos, dispatcher))
    }

    fn external_blueprint(store: &MemoryStore) {
        store.insert_blueprint(Blueprint {
            id: 1,
            title: String::new(),
            definition: r#"{"nodes": [{"id": 1, "type": "run", "inputs": [], "outputs": []}], "links": []}"#
                .into(),
        });
    }

    #[tokio::test]
    async fn create_starts_the_run() {
        let (store, svc) = service();
        external_blueprint(&store);

        let j = svc
            .create_judgement(CreateJudgement {
                blueprint_id: 1,
                args: Args::new(),
            })
            .await
            .unwrap();
        assert_eq!(j.status, JudgeStatus::Running);
    }

    #[tokio::test]
    async fn create_with_unknown_blueprint_is_not_found() {
        let (_store, svc) = service();
        let err = svc
            .create_judgement(CreateJudgement {
                blueprint_id: 9,
                args: Args::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn only_pending_judgements_can_be_canceled() {
        let (store, svc) = service();
        external_blueprint(&store);
        store.insert_judgement(Judgement::new(50, 1, Args::new()));

        let canceled = svc.cancel_judgement(50).unwrap();
        assert_eq!(canceled.status, JudgeStatus::Canceled);
        assert_eq!(canceled.score, NO_SCORE);
        assert_eq!(canceled.msg, "User cancel");

        assert!(matches!(svc.cancel_judgement(50), Err(ServiceError::Forbidden(_))));
        assert!(matches!(svc.cancel_judgement(51), Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn lists_by_submitter() {
        let (store, svc) = service();
        store.insert_submission(Submission {
            id: 3,
            name: String::new(),
            submitter_id: 7,
            problem_id: None,
            user_volume: String::new(),
        });
        let mut args = Args::new();
        args.insert("submission".into(), "3".into());
        store.insert_judgement(Judgement::new(1, 1, args));
        store.insert_judgement(Judgement::new(2, 1, Args::new()));

        let listed = svc.list_judgements(7).unwrap();
        assert_eq!(listed.iter().map(|j| j.id).collect::<Vec<_>>(), vec![1]);
        assert!(svc.list_judgements(8).unwrap().is_empty());
    }
}
