// src/engine/core.rs

//! Pure core scheduling state machine.
//!
//! This module contains a synchronous, deterministic "core" that consumes
//! [`RuntimeEvent`]s and produces:
//! - an updated graph and result store
//! - the blocks the IO shell should dispatch next
//! - the final outcome once nothing is left in flight
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for pushing
//! blocks to the process manager, waiting on completion channels with a
//! timeout, and feeding the resulting events back here.

use std::collections::HashMap;

use crate::dag::{BlockId, Graph, LinkId};
use crate::engine::RuntimeEvent;
use crate::engine::event_handlers::{
    CoreStep, handle_block_failed, handle_block_finished, handle_block_timed_out, handle_started,
};
use crate::model::Slot;

/// Mutable state of one run, shared by the event handlers.
#[derive(Debug)]
pub struct RunLedger {
    pub graph: Graph,
    /// Link id -> value carried by that link.
    pub results: HashMap<LinkId, Slot>,
    /// Blocks dispatched and not yet finished, failed or timed out.
    pub in_flight: usize,
    pub abandoned: Vec<BlockId>,
}

/// Pure core state for one judgement.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct ScheduleCore {
    ledger: RunLedger,
    finished: bool,
}

impl ScheduleCore {
    pub fn new(graph: Graph) -> Self {
        Self {
            ledger: RunLedger {
                graph,
                results: HashMap::new(),
                in_flight: 0,
                abandoned: Vec::new(),
            },
            finished: false,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.ledger.graph
    }

    pub fn result(&self, link: LinkId) -> Option<&Slot> {
        self.ledger.results.get(&link)
    }

    pub fn in_flight(&self) -> usize {
        self.ledger.in_flight
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Handle a single event and return what the shell should do next.
    ///
    /// Once an outcome has been produced, further events are ignored.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        if self.finished {
            return CoreStep::idle();
        }

        let step = match event {
            RuntimeEvent::Started => handle_started(&mut self.ledger),
            RuntimeEvent::BlockFinished { block, outputs } => {
                handle_block_finished(&mut self.ledger, block, outputs)
            }
            RuntimeEvent::BlockFailed { block, error } => {
                handle_block_failed(&mut self.ledger, block, error)
            }
            RuntimeEvent::BlockTimedOut { block } => {
                handle_block_timed_out(&mut self.ledger, block)
            }
        };

        if step.outcome.is_some() {
            self.finished = true;
        }
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{Block, Port, Properties};
    use crate::engine::{RunError, RunOutcome};
    use crate::process::TaskError;

    fn ids(step: &CoreStep) -> Vec<BlockId> {
        step.dispatch.iter().map(|d| d.block.id).collect()
    }

    /// 1 --(10,11)--> {2, 3}; 2 --(12)--> 4
    fn fan_out() -> Graph {
        let mut g = Graph::new();
        g.add_block(Block::new(1, "src", Properties::new(), vec![], vec![vec![10, 11]]))
            .unwrap();
        g.add_block(Block::new(2, "mid", Properties::new(), vec![10], vec![vec![12]]))
            .unwrap();
        g.add_block(Block::new(3, "sink", Properties::new(), vec![11], vec![]))
            .unwrap();
        g.add_block(Block::new(4, "sink", Properties::new(), vec![12], vec![]))
            .unwrap();
        g.add_link(10, Port { block: 1, slot: 0 }, Port { block: 2, slot: 0 })
            .unwrap();
        g.add_link(11, Port { block: 1, slot: 0 }, Port { block: 3, slot: 0 })
            .unwrap();
        g.add_link(12, Port { block: 2, slot: 0 }, Port { block: 4, slot: 0 })
            .unwrap();
        g
    }

    #[test]
    fn fan_out_writes_same_value_to_every_link() {
        let mut core = ScheduleCore::new(fan_out());
        assert_eq!(ids(&core.step(RuntimeEvent::Started)), vec![1]);

        let step = core.step(RuntimeEvent::BlockFinished {
            block: 1,
            outputs: vec![Slot::int(7)],
        });
        assert_eq!(ids(&step), vec![2, 3]);
        assert_eq!(core.result(10), Some(&Slot::int(7)));
        assert_eq!(core.result(11), Some(&Slot::int(7)));
        assert_eq!(step.dispatch[0].inputs, vec![Slot::int(7)]);
    }

    #[test]
    fn run_completes_when_nothing_in_flight() {
        let mut core = ScheduleCore::new(fan_out());
        core.step(RuntimeEvent::Started);
        core.step(RuntimeEvent::BlockFinished { block: 1, outputs: vec![Slot::int(1)] });
        core.step(RuntimeEvent::BlockFinished { block: 3, outputs: vec![] });
        let step = core.step(RuntimeEvent::BlockFinished {
            block: 2,
            outputs: vec![Slot::int(2)],
        });
        assert_eq!(ids(&step), vec![4]);
        assert!(step.outcome.is_none());

        let step = core.step(RuntimeEvent::BlockFinished { block: 4, outputs: vec![] });
        assert_eq!(step.outcome, Some(RunOutcome::Completed { abandoned: vec![] }));
        assert!(core.graph().is_complete());
        assert!(core.is_finished());
    }

    #[test]
    fn arity_mismatch_aborts_without_partial_write() {
        let mut core = ScheduleCore::new(fan_out());
        core.step(RuntimeEvent::Started);
        let step = core.step(RuntimeEvent::BlockFinished {
            block: 1,
            outputs: vec![Slot::int(1), Slot::int(2)],
        });

        assert_eq!(
            step.outcome,
            Some(RunOutcome::Failed(RunError::ArityMismatch {
                block: 1,
                expected: 1,
                got: 2
            }))
        );
        assert!(step.dispatch.is_empty());
        assert!(core.result(10).is_none());
    }

    #[test]
    fn timeout_abandons_branch() {
        let mut core = ScheduleCore::new(fan_out());
        core.step(RuntimeEvent::Started);
        core.step(RuntimeEvent::BlockFinished { block: 1, outputs: vec![Slot::int(1)] });
        core.step(RuntimeEvent::BlockTimedOut { block: 2 });
        let step = core.step(RuntimeEvent::BlockFinished { block: 3, outputs: vec![] });

        assert_eq!(step.outcome, Some(RunOutcome::Completed { abandoned: vec![2] }));
        assert_eq!(core.graph().pending_count(), 2, "2 and 4 never finish");
    }

    #[test]
    fn task_failure_aborts_and_later_events_are_ignored() {
        let mut core = ScheduleCore::new(fan_out());
        core.step(RuntimeEvent::Started);
        let step = core.step(RuntimeEvent::BlockFailed {
            block: 1,
            error: TaskError::Actuator("bad".into()),
        });
        assert!(matches!(
            step.outcome,
            Some(RunOutcome::Failed(RunError::TaskFailed { block: 1, .. }))
        ));

        let later = core.step(RuntimeEvent::BlockFinished { block: 1, outputs: vec![Slot::int(1)] });
        assert!(later.dispatch.is_empty() && later.outcome.is_none());
    }

    #[test]
    fn missing_upstream_value_is_structural() {
        // Link 5 is sourced by block 1, which declares no outputs: the value
        // can never be written.
        let mut g = Graph::new();
        g.add_block(Block::new(1, "src", Properties::new(), vec![], vec![]))
            .unwrap();
        g.add_block(Block::new(2, "dst", Properties::new(), vec![5], vec![]))
            .unwrap();
        g.add_link(5, Port { block: 1, slot: 0 }, Port { block: 2, slot: 0 })
            .unwrap();

        let mut core = ScheduleCore::new(g);
        core.step(RuntimeEvent::Started);
        let step = core.step(RuntimeEvent::BlockFinished { block: 1, outputs: vec![] });
        assert_eq!(
            step.outcome,
            Some(RunOutcome::Failed(RunError::MissingSlot { block: 2, link: 5 }))
        );
    }

    #[test]
    fn empty_graph_completes_immediately() {
        let mut core = ScheduleCore::new(Graph::new());
        let step = core.step(RuntimeEvent::Started);
        assert_eq!(step.outcome, Some(RunOutcome::Completed { abandoned: vec![] }));
    }
}
