// src/engine/event_handlers.rs

//! Event handling logic for the core.

use tracing::{debug, warn};

use crate::dag::BlockId;
use crate::engine::core::RunLedger;
use crate::engine::{Dispatch, RunError, RunOutcome};
use crate::model::Slots;
use crate::process::TaskError;

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreStep {
    /// Blocks the IO shell should hand to the process manager.
    pub dispatch: Vec<Dispatch>,
    /// Set once the run is over; the shell stops after this step.
    pub outcome: Option<RunOutcome>,
}

impl CoreStep {
    pub fn idle() -> Self {
        Self {
            dispatch: Vec::new(),
            outcome: None,
        }
    }

    fn failed(err: RunError) -> Self {
        Self {
            dispatch: Vec::new(),
            outcome: Some(RunOutcome::Failed(err)),
        }
    }
}

pub fn handle_started(ledger: &mut RunLedger) -> CoreStep {
    advance(ledger)
}

/// Fold a block's outputs into the result store and re-evaluate the
/// frontier.
///
/// Output count must match the declared arity exactly; on mismatch nothing
/// is written.
pub fn handle_block_finished(ledger: &mut RunLedger, block: BlockId, outputs: Slots) -> CoreStep {
    ledger.in_flight = ledger.in_flight.saturating_sub(1);

    let expected = match ledger.graph.block(block) {
        Some(b) => b.output_arity(),
        None => return CoreStep::failed(crate::dag::GraphError::UnknownBlock(block).into()),
    };
    if outputs.len() != expected {
        return CoreStep::failed(RunError::ArityMismatch {
            block,
            expected,
            got: outputs.len(),
        });
    }

    for (slot, value) in outputs.into_iter().enumerate() {
        let links: Vec<_> = ledger
            .graph
            .find_links_by_source_port(block, slot)
            .iter()
            .map(|l| l.id)
            .collect();
        for link in links {
            ledger.results.insert(link, value.clone());
        }
    }

    if let Err(err) = ledger.graph.done(block) {
        return CoreStep::failed(err.into());
    }
    debug!(block_id = block, in_flight = ledger.in_flight, "block done");

    advance(ledger)
}

pub fn handle_block_failed(ledger: &mut RunLedger, block: BlockId, error: TaskError) -> CoreStep {
    ledger.in_flight = ledger.in_flight.saturating_sub(1);
    warn!(block_id = block, error = %error, "block failed; aborting run");
    CoreStep::failed(RunError::TaskFailed { block, error })
}

/// The block stays `InQueue` forever; only the in-flight count moves.
pub fn handle_block_timed_out(ledger: &mut RunLedger, block: BlockId) -> CoreStep {
    ledger.in_flight = ledger.in_flight.saturating_sub(1);
    ledger.abandoned.push(block);
    warn!(block_id = block, in_flight = ledger.in_flight, "block timed out; abandoning it");
    advance(ledger)
}

/// Dispatch the current frontier, or finish if nothing is left in flight.
fn advance(ledger: &mut RunLedger) -> CoreStep {
    let ready = match ledger.graph.frontier() {
        Ok(ready) => ready,
        Err(err) => return CoreStep::failed(err.into()),
    };

    let mut dispatch = Vec::with_capacity(ready.len());
    for block in ready {
        let mut inputs = Vec::with_capacity(block.inputs.len());
        for link in &block.inputs {
            match ledger.results.get(link) {
                Some(slot) => inputs.push(slot.clone()),
                None => {
                    return CoreStep::failed(RunError::MissingSlot {
                        block: block.id,
                        link: *link,
                    });
                }
            }
        }
        dispatch.push(Dispatch { block, inputs });
    }

    ledger.in_flight += dispatch.len();

    if ledger.in_flight == 0 {
        return CoreStep {
            dispatch,
            outcome: Some(RunOutcome::Completed {
                abandoned: ledger.abandoned.clone(),
            }),
        };
    }

    CoreStep {
        dispatch,
        outcome: None,
    }
}
