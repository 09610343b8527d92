// src/dag/validate.rs

//! Structural checks run once after a definition has been parsed.

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::graph::{BlockId, Graph, GraphError};

/// Check that the graph is wired consistently and acyclic.
///
/// - every link connects two existing blocks on in-range slots
/// - every block input/output references an existing link pointing back at it
/// - the block dependency graph has no cycle
pub fn validate_graph(graph: &Graph) -> Result<(), GraphError> {
    validate_links(graph)?;
    validate_block_ports(graph)?;
    validate_acyclic(graph)?;
    Ok(())
}

fn validate_links(graph: &Graph) -> Result<(), GraphError> {
    for link in graph.links() {
        let source = graph
            .block(link.source.block)
            .ok_or_else(|| GraphError::MalformedLink {
                link: link.id,
                reason: format!("source block {} does not exist", link.source.block),
            })?;
        let target = graph
            .block(link.target.block)
            .ok_or_else(|| GraphError::MalformedLink {
                link: link.id,
                reason: format!("target block {} does not exist", link.target.block),
            })?;

        if link.source.slot >= source.outputs.len() {
            return Err(GraphError::MalformedLink {
                link: link.id,
                reason: format!(
                    "source slot {} out of range for block {} ({} outputs)",
                    link.source.slot,
                    source.id,
                    source.outputs.len()
                ),
            });
        }
        if !target.inputs.contains(&link.id) {
            return Err(GraphError::MalformedLink {
                link: link.id,
                reason: format!("target block {} does not list it as an input", target.id),
            });
        }
    }
    Ok(())
}

fn validate_block_ports(graph: &Graph) -> Result<(), GraphError> {
    for block in graph.blocks() {
        for link_id in &block.inputs {
            match graph.link(*link_id) {
                Some(link) if link.target.block == block.id => {}
                _ => {
                    return Err(GraphError::DanglingLink {
                        block: block.id,
                        link: *link_id,
                    });
                }
            }
        }

        for (slot, fan) in block.outputs.iter().enumerate() {
            for link_id in fan {
                match graph.link(*link_id) {
                    Some(link) if link.source.block == block.id && link.source.slot == slot => {}
                    _ => {
                        return Err(GraphError::MalformedLink {
                            link: *link_id,
                            reason: format!(
                                "listed on output {} of block {} but not sourced there",
                                slot, block.id
                            ),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

fn validate_acyclic(graph: &Graph) -> Result<(), GraphError> {
    // Edge direction: producer -> consumer.
    let mut deps: DiGraphMap<BlockId, ()> = DiGraphMap::new();

    for block in graph.blocks() {
        deps.add_node(block.id);
    }
    for link in graph.links() {
        deps.add_edge(link.source.block, link.target.block, ());
    }

    match toposort(&deps, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(GraphError::Cycle(cycle.node_id())),
    }
}
