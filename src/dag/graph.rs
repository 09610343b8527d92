// src/dag/graph.rs

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};

pub type BlockId = i64;
pub type LinkId = i64;

/// Property map of a block, straight from the definition.
pub type Properties = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockStatus {
    Pending,
    InQueue,
    Done,
}

/// One DAG node.
///
/// `inputs[i]` is the link feeding input slot `i`; `outputs[j]` lists every
/// link fanned out from output slot `j` (possibly none).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub id: BlockId,
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: Properties,
    pub inputs: Vec<LinkId>,
    pub outputs: Vec<Vec<LinkId>>,
    pub status: BlockStatus,
}

impl Block {
    pub fn new(
        id: BlockId,
        kind: impl Into<String>,
        properties: Properties,
        inputs: Vec<LinkId>,
        outputs: Vec<Vec<LinkId>>,
    ) -> Self {
        Self {
            id,
            kind: kind.into(),
            properties,
            inputs,
            outputs,
            status: BlockStatus::Pending,
        }
    }

    /// Number of slots the block must produce when it finishes.
    pub fn output_arity(&self) -> usize {
        self.outputs.len()
    }
}

/// A (block, slot index) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Port {
    pub block: BlockId,
    pub slot: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Link {
    pub id: LinkId,
    pub source: Port,
    pub target: Port,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate block id {0}")]
    DuplicateBlock(BlockId),

    #[error("duplicate link id {0}")]
    DuplicateLink(LinkId),

    #[error("block {block} reads link {link}, which has no producing block")]
    DanglingLink { block: BlockId, link: LinkId },

    #[error("unknown block id {0}")]
    UnknownBlock(BlockId),

    #[error("link {link} is malformed: {reason}")]
    MalformedLink { link: LinkId, reason: String },

    #[error("cycle detected in blueprint involving block {0}")]
    Cycle(BlockId),
}

/// Blocks and links of a single judgement.
///
/// Built once from a definition and then only advanced through
/// [`Graph::frontier`] and [`Graph::done`]. Blocks are kept ordered by id, so
/// the frontier is always returned in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    blocks: BTreeMap<BlockId, Block>,
    links: BTreeMap<LinkId, Link>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&mut self, block: Block) -> Result<(), GraphError> {
        if self.blocks.contains_key(&block.id) {
            return Err(GraphError::DuplicateBlock(block.id));
        }
        self.blocks.insert(block.id, block);
        Ok(())
    }

    pub fn add_link(
        &mut self,
        id: LinkId,
        source: Port,
        target: Port,
    ) -> Result<(), GraphError> {
        if self.links.contains_key(&id) {
            return Err(GraphError::DuplicateLink(id));
        }
        self.links.insert(id, Link { id, source, target });
        Ok(())
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Every link fed by output slot `slot` of block `id`.
    ///
    /// Unknown blocks and out-of-range slots yield an empty list.
    pub fn find_links_by_source_port(&self, id: BlockId, slot: usize) -> Vec<&Link> {
        self.blocks
            .get(&id)
            .and_then(|b| b.outputs.get(slot))
            .map(|ids| ids.iter().filter_map(|l| self.links.get(l)).collect())
            .unwrap_or_default()
    }

    /// Blocks that just became runnable.
    ///
    /// A pending block is ready once the source of every one of its input
    /// links is `Done`. Ready blocks are moved to `InQueue` before being
    /// returned, so a second call without an intervening [`Graph::done`]
    /// never returns them again.
    pub fn frontier(&mut self) -> Result<Vec<Block>, GraphError> {
        let mut ready = Vec::new();

        for block in self.blocks.values() {
            if block.status != BlockStatus::Pending {
                continue;
            }
            if self.inputs_satisfied(block)? {
                ready.push(block.id);
            }
        }

        let mut out = Vec::with_capacity(ready.len());
        for id in ready {
            if let Some(block) = self.blocks.get_mut(&id) {
                block.status = BlockStatus::InQueue;
                trace!(block_id = id, kind = %block.kind, "block entered frontier");
                out.push(block.clone());
            }
        }

        if !out.is_empty() {
            debug!(count = out.len(), "frontier computed");
        }
        Ok(out)
    }

    fn inputs_satisfied(&self, block: &Block) -> Result<bool, GraphError> {
        for link_id in &block.inputs {
            let source = self
                .links
                .get(link_id)
                .and_then(|l| self.blocks.get(&l.source.block))
                .ok_or(GraphError::DanglingLink {
                    block: block.id,
                    link: *link_id,
                })?;
            if source.status != BlockStatus::Done {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Mark a block complete. Called exactly once per block.
    pub fn done(&mut self, id: BlockId) -> Result<(), GraphError> {
        let block = self
            .blocks
            .get_mut(&id)
            .ok_or(GraphError::UnknownBlock(id))?;
        block.status = BlockStatus::Done;
        Ok(())
    }

    pub fn status_of(&self, id: BlockId) -> Option<BlockStatus> {
        self.blocks.get(&id).map(|b| b.status)
    }

    /// Blocks not yet finished.
    pub fn pending_count(&self) -> usize {
        self.blocks
            .values()
            .filter(|b| b.status != BlockStatus::Done)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.pending_count() == 0
    }
}
