// src/dispatch/mod.rs

//! The dispatcher: a single actor that turns judgements into runs.
//!
//! Callers talk to it through a cloneable [`DispatcherHandle`]. A submission
//! is answered once the judgement's graph has been built and the judgement
//! marked `Running`; the run itself continues in a supervisor task that
//! persists the verdict and announces the finished judgement on a broadcast
//! channel.

use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::dag::{DefinitionError, TemplateContext, build_graph};
use crate::engine::{Runtime, ScheduleCore, SchedulerOptions, apply_report};
use crate::model::{JudgeStatus, Judgement, JudgementHandle, JudgementId, NO_SCORE};
use crate::process::ProcessManager;
use crate::store::{JudgementRepository, Repositories, Transition};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("judgement {0} is already processing")]
    AlreadyProcessing(JudgementId),

    #[error("judgement {0} not found")]
    NotFound(JudgementId),

    #[error("judgement {id} is {status}, not Pending")]
    NotPending { id: JudgementId, status: JudgeStatus },

    #[error("blueprint {0} not found")]
    BlueprintNotFound(i64),

    #[error("invalid blueprint definition: {0}")]
    Definition(#[from] DefinitionError),

    #[error("dispatcher stopped")]
    Stopped,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Capacity of the command channel and of the completion broadcast.
    pub queue_capacity: usize,
    pub scheduler: SchedulerOptions,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            scheduler: SchedulerOptions::default(),
        }
    }
}

enum Command {
    Submit {
        judgement_id: JudgementId,
        reply: oneshot::Sender<Result<(), DispatchError>>,
    },
    Completed {
        judgement_id: JudgementId,
    },
}

/// Cheaply cloneable handle to the dispatcher actor.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    commands: mpsc::Sender<Command>,
    finished: broadcast::Sender<Judgement>,
}

impl DispatcherHandle {
    /// Start running a persisted `Pending` judgement.
    ///
    /// Returns once the run has started. Definition errors are reported here
    /// and also persisted on the judgement as `SystemError`.
    pub async fn submit(&self, judgement_id: JudgementId) -> Result<(), DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                judgement_id,
                reply,
            })
            .await
            .map_err(|_| DispatchError::Stopped)?;
        rx.await.map_err(|_| DispatchError::Stopped)?
    }

    /// Judgements in their final state, as each run ends.
    pub fn subscribe(&self) -> broadcast::Receiver<Judgement> {
        self.finished.subscribe()
    }

    /// Re-submit every judgement left `Pending` by a previous process.
    ///
    /// Graphs restart from scratch. Returns how many runs were started.
    pub async fn restore_pending(&self, judgements: &dyn JudgementRepository) -> anyhow::Result<usize> {
        let pending = judgements.pending()?;
        info!(count = pending.len(), "restoring pending judgements");

        let mut started = 0;
        for judgement in pending {
            match self.submit(judgement.id).await {
                Ok(()) => started += 1,
                Err(DispatchError::Stopped) => return Err(DispatchError::Stopped.into()),
                Err(err) => warn!(judgement_id = judgement.id, error = %err, "could not restore judgement"),
            }
        }
        Ok(started)
    }
}

/// Actor state. Only the actor task touches it.
pub struct Dispatcher {
    repos: Repositories,
    manager: ProcessManager,
    options: DispatcherOptions,
    active: HashSet<JudgementId>,
    /// Weak so the actor stops once every handle is dropped.
    commands: mpsc::WeakSender<Command>,
    finished: broadcast::Sender<Judgement>,
}

impl Dispatcher {
    /// Spawn the actor loop and return its handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        repos: Repositories,
        manager: ProcessManager,
        options: DispatcherOptions,
    ) -> DispatcherHandle {
        let capacity = options.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (finished, _) = broadcast::channel(capacity);

        let dispatcher = Dispatcher {
            repos,
            manager,
            options,
            active: HashSet::new(),
            commands: tx.downgrade(),
            finished: finished.clone(),
        };
        tokio::spawn(dispatcher.run(rx));

        DispatcherHandle {
            commands: tx,
            finished,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!("dispatcher started");

        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Submit {
                    judgement_id,
                    reply,
                } => {
                    let result = self.start(judgement_id);
                    if let Err(err) = &result {
                        warn!(judgement_id, error = %err, "judgement not started");
                    }
                    let _ = reply.send(result);
                }
                Command::Completed { judgement_id } => {
                    self.active.remove(&judgement_id);
                    debug!(judgement_id, active = self.active.len(), "run slot released");
                }
            }
        }

        info!("dispatcher stopped (all handles dropped)");
    }

    fn start(&mut self, judgement_id: JudgementId) -> Result<(), DispatchError> {
        if self.active.contains(&judgement_id) {
            return Err(DispatchError::AlreadyProcessing(judgement_id));
        }

        let judgement = self
            .repos
            .judgements
            .get(judgement_id)?
            .ok_or(DispatchError::NotFound(judgement_id))?;
        if judgement.status != JudgeStatus::Pending {
            return Err(DispatchError::NotPending {
                id: judgement_id,
                status: judgement.status,
            });
        }

        let (runtime, handle) = match self.prepare(judgement)? {
            Prepared::Ready(runtime, handle) => (runtime, handle),
            Prepared::Rejected(err) => return Err(err.into()),
        };

        self.active.insert(judgement_id);
        tokio::spawn(supervise(
            runtime,
            handle,
            self.repos.clone(),
            self.commands.clone(),
            self.finished.clone(),
        ));

        info!(judgement_id, "judgement running");
        Ok(())
    }

    /// Resolve collaborators, build the graph and mark the judgement running.
    fn prepare(&self, judgement: Judgement) -> Result<Prepared, DispatchError> {
        let blueprint = self
            .repos
            .blueprints
            .get(judgement.blueprint_id)?
            .ok_or(DispatchError::BlueprintNotFound(judgement.blueprint_id))?;

        let submission = match judgement.arg_id("submission") {
            Some(id) => self.repos.submissions.get(id)?,
            None => None,
        };
        let problem_id = submission
            .as_ref()
            .and_then(|s| s.problem_id)
            .or_else(|| judgement.arg_id("problem"));
        let problem = match problem_id {
            Some(id) => self.repos.problems.get(id)?,
            None => None,
        };
        let programs = self.repos.programs.list()?;

        let ctx = TemplateContext::for_judgement(&judgement, submission.as_ref(), problem.as_ref());
        let graph = match build_graph(&blueprint.definition, &ctx, &programs) {
            Ok(graph) => graph,
            Err(err) => {
                let msg = err.to_string();
                let rejected = self.transition(judgement.id, &mut |j: &mut Judgement| {
                    j.status = JudgeStatus::SystemError;
                    j.score = NO_SCORE;
                    j.msg = msg.clone();
                })?;
                let _ = self.finished.send(rejected);
                return Ok(Prepared::Rejected(err));
            }
        };

        // A cancel may have landed while the graph was being built.
        let running = self.transition(judgement.id, &mut |j: &mut Judgement| {
            j.status = JudgeStatus::Running;
        })?;
        debug!(
            judgement_id = running.id,
            blueprint_id = blueprint.id,
            blocks = graph.len(),
            "graph built"
        );

        let handle = running.into_handle();
        let runtime = Runtime::new(
            ScheduleCore::new(graph),
            handle.clone(),
            self.manager.clone(),
            self.options.scheduler.clone(),
        );
        Ok(Prepared::Ready(runtime, handle))
    }

    /// Move a judgement out of `Pending`, failing if something else already did.
    fn transition(
        &self,
        id: JudgementId,
        change: &mut dyn FnMut(&mut Judgement),
    ) -> Result<Judgement, DispatchError> {
        match self.repos.judgements.update_if(id, JudgeStatus::Pending, change)? {
            Transition::Applied(judgement) => Ok(judgement),
            Transition::Stale(current) => Err(DispatchError::NotPending {
                id,
                status: current.status,
            }),
            Transition::Missing => Err(DispatchError::NotFound(id)),
        }
    }
}

enum Prepared {
    Ready(Runtime, JudgementHandle),
    Rejected(DefinitionError),
}

/// Wait for one run, persist its verdict and release the run slot.
async fn supervise(
    runtime: Runtime,
    judgement: JudgementHandle,
    repos: Repositories,
    commands: mpsc::WeakSender<Command>,
    finished: broadcast::Sender<Judgement>,
) {
    let report = runtime.run().await;

    let final_state = {
        let mut j = judgement.lock();
        apply_report(&mut j, &report);
        j.clone()
    };

    info!(
        judgement_id = final_state.id,
        status = %final_state.status,
        score = final_state.score,
        "judgement finished"
    );
    let verdict = final_state.clone();
    let stored = repos.judgements.update_if(
        final_state.id,
        JudgeStatus::Running,
        &mut |j: &mut Judgement| *j = verdict.clone(),
    );
    let final_state = match stored {
        Ok(Transition::Applied(j)) => j,
        Ok(Transition::Stale(current)) => {
            warn!(
                judgement_id = current.id,
                status = %current.status,
                terminal = current.status.is_terminal(),
                "judgement left Running during the run; verdict dropped"
            );
            current
        }
        Ok(Transition::Missing) => {
            error!(judgement_id = final_state.id, "judgement vanished before its verdict was stored");
            final_state
        }
        Err(err) => {
            error!(judgement_id = final_state.id, error = %err, "failed to persist verdict");
            final_state
        }
    };

    let judgement_id = final_state.id;
    let _ = finished.send(final_state);
    let delivered = match commands.upgrade() {
        Some(tx) => tx.send(Command::Completed { judgement_id }).await.is_ok(),
        None => false,
    };
    if !delivered {
        debug!(judgement_id, "dispatcher gone before completion was reported");
    }
}
