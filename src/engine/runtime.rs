// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::engine::core::ScheduleCore;
use crate::engine::{
    Dispatch, RunError, RunOutcome, RunReport, RuntimeEvent, SchedulerOptions,
};
use crate::model::JudgementHandle;
use crate::process::{ProcessManager, TaskError};

/// Drives one judgement's graph to completion.
///
/// This is a pure IO shell around [`ScheduleCore`], which contains all the
/// scheduling semantics. Each dispatched block gets its own worker, which
/// pushes the block to the [`ProcessManager`], waits on the completion
/// channel with a bounded timeout and reports back over an mpsc channel.
pub struct Runtime {
    core: ScheduleCore,
    judgement: JudgementHandle,
    manager: ProcessManager,
    options: SchedulerOptions,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        core: ScheduleCore,
        judgement: JudgementHandle,
        manager: ProcessManager,
        options: SchedulerOptions,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(64);
        Self {
            core,
            judgement,
            manager,
            options,
            event_tx,
            event_rx,
        }
    }

    /// Main event loop.
    ///
    /// - Feeds events into the core.
    /// - Spawns a worker for every block the core dispatches.
    /// - Stops as soon as the core reports an outcome.
    pub async fn run(mut self) -> RunReport {
        let judgement_id = self.judgement.lock().id;
        info!(judgement_id, blocks = self.core.graph().len(), "judgement run started");

        let mut workers = JoinSet::new();
        let mut step = self.core.step(RuntimeEvent::Started);

        let outcome = loop {
            for dispatch in step.dispatch {
                self.spawn_worker(&mut workers, dispatch);
            }
            if let Some(outcome) = step.outcome {
                break outcome;
            }

            let Some(event) = self.event_rx.recv().await else {
                break RunOutcome::Failed(RunError::Interrupted);
            };
            debug!(judgement_id, ?event, "runtime received event");
            step = self.core.step(event);
        };

        // Workers still waiting belong to an aborted run.
        workers.abort_all();
        self.manager.purge_judgement(judgement_id);

        let score = self.judgement.lock().score;
        match &outcome {
            RunOutcome::Completed { abandoned } => {
                info!(judgement_id, score, abandoned = abandoned.len(), "judgement run completed")
            }
            RunOutcome::Failed(err) => {
                warn!(judgement_id, error = %err, "judgement run aborted")
            }
        }

        RunReport {
            judgement_id,
            score,
            outcome,
        }
    }

    fn spawn_worker(&self, workers: &mut JoinSet<()>, dispatch: Dispatch) {
        let manager = self.manager.clone();
        let judgement = self.judgement.clone();
        let tx = self.event_tx.clone();
        let wait = self.options.timeout_for(&dispatch.block.kind);

        workers.spawn(async move {
            let Dispatch { block, inputs } = dispatch;
            let block_id = block.id;
            let rx = manager.push(judgement, &block, inputs).await;

            let event = match tokio::time::timeout(wait, rx).await {
                Ok(Ok(Ok(outputs))) => RuntimeEvent::BlockFinished {
                    block: block_id,
                    outputs,
                },
                Ok(Ok(Err(error))) => RuntimeEvent::BlockFailed {
                    block: block_id,
                    error,
                },
                Ok(Err(_closed)) => RuntimeEvent::BlockFailed {
                    block: block_id,
                    error: TaskError::Dropped,
                },
                Err(_elapsed) => {
                    warn!(
                        block_id,
                        kind = %block.kind,
                        wait_ms = wait.as_millis() as u64,
                        "no result within bounded wait"
                    );
                    RuntimeEvent::BlockTimedOut { block: block_id }
                }
            };

            if tx.send(event).await.is_err() {
                debug!(block_id, "runtime gone before worker reported");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::builtin::{constant, result, Catalog};
    use crate::dag::{Block, Graph, Port, Properties};
    use crate::model::{Args, Judgement, Slot};
    use crate::process::{Delivery, ManagerOptions, WILDCARD};

    fn manager() -> ProcessManager {
        ProcessManager::new(
            Catalog::new()
                .with_handler(result::ResultCapture)
                .with_handler(constant::ConstInt),
            ManagerOptions::default(),
        )
    }

    fn props(value: serde_json::Value) -> Properties {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Properties::new(),
        }
    }

    /// `const_int(v)` (block 1) --link 5--> `kind` (block 2)
    fn pipeline(v: i64, kind: &str) -> Graph {
        let mut g = Graph::new();
        g.add_block(Block::new(1, "const_int", props(json!({"value": v})), vec![], vec![vec![5]]))
            .unwrap();
        g.add_block(Block::new(2, kind, Properties::new(), vec![5], vec![]))
            .unwrap();
        g.add_link(5, Port { block: 1, slot: 0 }, Port { block: 2, slot: 0 })
            .unwrap();
        g
    }

    fn run(graph: Graph, manager: ProcessManager, options: SchedulerOptions) -> (JudgementHandle, Runtime) {
        let judgement = Judgement::new(9, 1, Args::new()).into_handle();
        let runtime = Runtime::new(ScheduleCore::new(graph), judgement.clone(), manager, options);
        (judgement, runtime)
    }

    #[tokio::test]
    async fn builtin_only_graph_runs_to_completion() {
        let (judgement, runtime) = run(pipeline(100, "result"), manager(), SchedulerOptions::default());

        let report = runtime.run().await;

        assert_eq!(report.outcome, RunOutcome::Completed { abandoned: vec![] });
        assert_eq!(report.score, 100.0);
        assert_eq!(judgement.lock().score, 100.0);
    }

    #[tokio::test]
    async fn external_block_waits_for_actuator() {
        let m = manager();
        let (_judgement, runtime) = run(pipeline(3, "compile"), m.clone(), SchedulerOptions::default());
        let handle = tokio::spawn(runtime.run());

        let task = loop {
            if let Some(t) = m.fetch(WILDCARD, WILDCARD, "compile", false) {
                break t;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert_eq!(task.inputs, vec![Slot::int(3)]);

        let r = m.reserve(&task.task_id).unwrap();
        m.finish_reserved(&task.task_id, &r.token, vec![]).unwrap();

        let report = handle.await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed { abandoned: vec![] });
        assert_eq!(report.score, -1.0);
    }

    #[tokio::test]
    async fn unanswered_block_is_abandoned_after_its_timeout() {
        let m = manager();
        let mut options = SchedulerOptions::default();
        options.timeouts.insert("compile".into(), Duration::from_millis(30));
        let (_judgement, runtime) = run(pipeline(1, "compile"), m.clone(), options);

        let report = runtime.run().await;

        assert_eq!(report.outcome, RunOutcome::Completed { abandoned: vec![2] });
        assert!(m.is_empty(), "leftover tasks are purged");
    }

    #[tokio::test]
    async fn late_result_for_abandoned_block_is_discarded() {
        let m = manager();
        let mut g = Graph::new();
        g.add_block(Block::new(1, "slow", Properties::new(), vec![], vec![])).unwrap();
        g.add_block(Block::new(2, "steady", Properties::new(), vec![], vec![])).unwrap();
        let mut options = SchedulerOptions::default();
        options.timeouts.insert("slow".into(), Duration::from_millis(30));
        let (_judgement, runtime) = run(g, m.clone(), options);
        let handle = tokio::spawn(runtime.run());

        let slow = loop {
            if let Some(t) = m.fetch(WILDCARD, WILDCARD, "slow", false) {
                break t;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Block 2 keeps the run alive, so the abandoned task is still queued.
        assert_eq!(m.finish(&slow.task_id, vec![]), Ok(Delivery::Discarded));

        let steady = m.fetch(WILDCARD, WILDCARD, "steady", false).unwrap();
        assert_eq!(m.finish(&steady.task_id, vec![]), Ok(Delivery::Delivered));

        let report = handle.await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed { abandoned: vec![1] });
    }

    #[tokio::test]
    async fn actuator_error_aborts_run() {
        let m = manager();
        let (_judgement, runtime) = run(pipeline(1, "compile"), m.clone(), SchedulerOptions::default());
        let handle = tokio::spawn(runtime.run());

        let task = loop {
            if let Some(t) = m.fetch(WILDCARD, WILDCARD, "compile", false) {
                break t;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        m.finish_with_error(&task.task_id, "compile error").unwrap();

        let report = handle.await.unwrap();
        assert_eq!(
            report.outcome,
            RunOutcome::Failed(RunError::TaskFailed {
                block: 2,
                error: TaskError::Actuator("compile error".into()),
            })
        );
    }
}
