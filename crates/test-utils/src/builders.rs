#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use judgedag::builtin::Catalog;
use judgedag::dispatch::{Dispatcher, DispatcherHandle, DispatcherOptions};
use judgedag::engine::SchedulerOptions;
use judgedag::model::{Blueprint, BlueprintId, Judgement, JudgementId};
use judgedag::process::{ManagerOptions, ProcessManager};
use judgedag::server::AppState;
use judgedag::service::{JudgementService, TaskService};
use judgedag::store::{MemoryStore, Repositories};
use serde_json::{Value, json};
use tokio::sync::broadcast;

/// Builder for blueprint definitions in the node layout.
///
/// Port counts are inferred from the links; use [`BlueprintBuilder::outputs`]
/// to declare output ports nobody consumes.
#[derive(Debug, Default, Clone)]
pub struct BlueprintBuilder {
    nodes: Vec<NodeSpec>,
    links: Vec<LinkSpec>,
}

#[derive(Debug, Clone)]
struct NodeSpec {
    id: i64,
    kind: String,
    properties: Value,
    outputs: usize,
}

#[derive(Debug, Clone, Copy)]
struct LinkSpec {
    id: i64,
    from: (i64, usize),
    to: (i64, usize),
}

impl BlueprintBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(mut self, id: i64, kind: &str, properties: Value) -> Self {
        self.nodes.push(NodeSpec {
            id,
            kind: kind.to_string(),
            properties,
            outputs: 0,
        });
        self
    }

    /// Declare at least `n` output ports on block `id`.
    pub fn outputs(mut self, id: i64, n: usize) -> Self {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            node.outputs = node.outputs.max(n);
        }
        self
    }

    /// Link `from = (block, slot)` to `to = (block, slot)`.
    pub fn link(mut self, id: i64, from: (i64, usize), to: (i64, usize)) -> Self {
        self.links.push(LinkSpec { id, from, to });
        self
    }

    pub fn build(&self) -> String {
        let nodes: Vec<Value> = self
            .nodes
            .iter()
            .map(|node| {
                let input_count = self
                    .links
                    .iter()
                    .filter(|l| l.to.0 == node.id)
                    .map(|l| l.to.1 + 1)
                    .max()
                    .unwrap_or(0);
                let output_count = self
                    .links
                    .iter()
                    .filter(|l| l.from.0 == node.id)
                    .map(|l| l.from.1 + 1)
                    .max()
                    .unwrap_or(0)
                    .max(node.outputs);

                let inputs: Vec<Value> = (0..input_count)
                    .map(|slot| {
                        let link = self
                            .links
                            .iter()
                            .find(|l| l.to == (node.id, slot))
                            .map(|l| json!(l.id))
                            .unwrap_or(Value::Null);
                        json!({ "link": link })
                    })
                    .collect();
                let outputs: Vec<Value> = (0..output_count)
                    .map(|slot| {
                        let links: Vec<i64> = self
                            .links
                            .iter()
                            .filter(|l| l.from == (node.id, slot))
                            .map(|l| l.id)
                            .collect();
                        if links.is_empty() {
                            json!({ "links": null })
                        } else {
                            json!({ "links": links })
                        }
                    })
                    .collect();

                json!({
                    "id": node.id,
                    "type": node.kind,
                    "properties": node.properties,
                    "inputs": inputs,
                    "outputs": outputs,
                })
            })
            .collect();

        let links: Vec<Value> = self
            .links
            .iter()
            .map(|l| json!([l.id, l.from.0, l.from.1, l.to.0, l.to.1]))
            .collect();

        json!({ "nodes": nodes, "links": links }).to_string()
    }

    pub fn blueprint(&self, id: BlueprintId) -> Blueprint {
        Blueprint {
            id,
            title: format!("test blueprint {id}"),
            definition: self.build(),
        }
    }
}

/// A fully wired engine over a fresh [`MemoryStore`].
pub struct TestEngine {
    pub store: Arc<MemoryStore>,
    pub repos: Repositories,
    pub manager: ProcessManager,
    pub dispatcher: DispatcherHandle,
}

impl TestEngine {
    /// Short lock TTL and task timeout so expiry paths run quickly.
    pub fn new() -> Self {
        Self::with_options(
            ManagerOptions {
                lock_ttl: Duration::from_millis(200),
                admission_capacity: 16,
            },
            SchedulerOptions {
                task_timeout: Duration::from_secs(3),
                ..SchedulerOptions::default()
            },
        )
    }

    pub fn with_options(manager: ManagerOptions, scheduler: SchedulerOptions) -> Self {
        let store = Arc::new(MemoryStore::new());
        let repos = Repositories::memory(store.clone());
        let manager = ProcessManager::new(Catalog::standard(&repos), manager);
        let dispatcher = Dispatcher::spawn(
            repos.clone(),
            manager.clone(),
            DispatcherOptions {
                queue_capacity: 16,
                scheduler,
            },
        );
        Self {
            store,
            repos,
            manager,
            dispatcher,
        }
    }

    pub fn tasks(&self) -> TaskService {
        TaskService::new(self.manager.clone())
    }

    pub fn judgements(&self) -> JudgementService {
        JudgementService::new(self.repos.clone(), self.dispatcher.clone())
    }

    pub fn app_state(&self) -> Arc<AppState> {
        AppState::new(self.tasks(), self.judgements())
    }

    /// Wait for the final state of `id` on a receiver subscribed beforehand.
    pub async fn finished(
        rx: &mut broadcast::Receiver<Judgement>,
        id: JudgementId,
    ) -> Judgement {
        loop {
            let j = rx.recv().await.expect("dispatcher stopped");
            if j.id == id {
                return j;
            }
        }
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}
