// src/dag/definition.rs

//! Blueprint definition parsing.
//!
//! Two JSON layouts are accepted:
//!
//! - the node-list layout, where each node carries its own `inputs`/`outputs`
//!   and links are arrays `[id, src, srcSlot, dst, dstSlot, type?]`;
//! - the scene layout, where blocks only carry a type name and property
//!   values, and links are objects `{id, originID, originSlot, targetID,
//!   targetSlot}`.
//!
//! Whenever a block does not spell out its ports, arity comes from the
//! [`Program`] schema whose name matches the block type.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::dag::graph::{Block, BlockId, Graph, GraphError, LinkId, Port, Properties};
use crate::dag::validate::validate_graph;
use crate::model::Program;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    #[error("malformed blueprint: {0}")]
    Malformed(String),

    #[error("unknown block schema '{0}'")]
    UnknownSchema(String),

    #[error("unresolved template token(s): {0}")]
    UnresolvedToken(String),

    #[error("link {link} uses slot {slot} of block {block}, which has {arity} {side}")]
    SlotOutOfRange {
        link: LinkId,
        block: BlockId,
        slot: usize,
        arity: usize,
        side: &'static str,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl From<serde_json::Error> for DefinitionError {
    fn from(err: serde_json::Error) -> Self {
        DefinitionError::Malformed(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDefinition {
    Nodes(NodeDocument),
    Scene(SceneDocument),
}

#[derive(Debug, Deserialize)]
struct NodeDocument {
    nodes: Vec<RawNode>,
    #[serde(default)]
    links: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    id: BlockId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    inputs: Option<Vec<RawInput>>,
    #[serde(default)]
    outputs: Option<Vec<RawOutput>>,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    #[serde(default)]
    link: Option<LinkId>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    #[serde(default)]
    links: Option<Vec<LinkId>>,
}

#[derive(Debug, Deserialize)]
struct SceneDocument {
    blocks: Vec<SceneBlock>,
    #[serde(default)]
    links: Vec<SceneLink>,
}

#[derive(Debug, Deserialize)]
struct SceneBlock {
    id: BlockId,
    name: String,
    #[serde(default)]
    values: SceneValues,
}

#[derive(Debug, Default, Deserialize)]
struct SceneValues {
    #[serde(default)]
    property: BTreeMap<String, SceneValue>,
}

#[derive(Debug, Deserialize)]
struct SceneValue {
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SceneLink {
    id: LinkId,
    #[serde(rename = "originID")]
    origin_id: BlockId,
    origin_slot: usize,
    #[serde(rename = "targetID")]
    target_id: BlockId,
    target_slot: usize,
}

/// Format-neutral intermediate form.
struct BlockSpec {
    id: BlockId,
    kind: String,
    properties: Properties,
    /// `None` when the definition left port layout to the schema.
    inputs: Option<Vec<Option<LinkId>>>,
    outputs: Option<Vec<Vec<LinkId>>>,
}

/// Parse an already-substituted definition into a validated [`Graph`].
pub fn parse_definition(text: &str, programs: &[Program]) -> Result<Graph, DefinitionError> {
    let raw: RawDefinition = serde_json::from_str(text)?;

    let (specs, links) = match raw {
        RawDefinition::Nodes(doc) => from_nodes(doc)?,
        RawDefinition::Scene(doc) => from_scene(doc),
    };

    let graph = assemble(specs, links, programs)?;
    validate_graph(&graph)?;

    debug!(
        blocks = graph.len(),
        links = graph.links().count(),
        "blueprint parsed"
    );
    Ok(graph)
}

fn from_nodes(doc: NodeDocument) -> Result<(Vec<BlockSpec>, Vec<(LinkId, Port, Port)>), DefinitionError> {
    let specs = doc
        .nodes
        .into_iter()
        .map(|n| BlockSpec {
            id: n.id,
            kind: n.kind,
            properties: n.properties,
            inputs: n
                .inputs
                .map(|ins| ins.into_iter().map(|i| i.link).collect()),
            outputs: n.outputs.map(|outs| {
                outs.into_iter()
                    .map(|o| o.links.unwrap_or_default())
                    .collect()
            }),
        })
        .collect();

    let links = doc
        .links
        .iter()
        .map(|row| node_link(row))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((specs, links))
}

fn node_link(row: &[Value]) -> Result<(LinkId, Port, Port), DefinitionError> {
    let int = |idx: usize, what: &str| -> Result<i64, DefinitionError> {
        row.get(idx).and_then(Value::as_i64).ok_or_else(|| {
            DefinitionError::Malformed(format!("link entry {row:?} has no integer {what}"))
        })
    };
    let slot = |idx: usize, what: &str| -> Result<usize, DefinitionError> {
        let v = int(idx, what)?;
        usize::try_from(v)
            .map_err(|_| DefinitionError::Malformed(format!("negative {what} in link {row:?}")))
    };

    Ok((
        int(0, "id")?,
        Port {
            block: int(1, "source block")?,
            slot: slot(2, "source slot")?,
        },
        Port {
            block: int(3, "target block")?,
            slot: slot(4, "target slot")?,
        },
    ))
}

fn from_scene(doc: SceneDocument) -> (Vec<BlockSpec>, Vec<(LinkId, Port, Port)>) {
    let specs = doc
        .blocks
        .into_iter()
        .map(|b| BlockSpec {
            id: b.id,
            kind: b.name,
            properties: b
                .values
                .property
                .into_iter()
                .map(|(k, v)| (k, v.value))
                .collect(),
            inputs: None,
            outputs: None,
        })
        .collect();

    let links = doc
        .links
        .into_iter()
        .map(|l| {
            (
                l.id,
                Port {
                    block: l.origin_id,
                    slot: l.origin_slot,
                },
                Port {
                    block: l.target_id,
                    slot: l.target_slot,
                },
            )
        })
        .collect();

    (specs, links)
}

fn assemble(
    specs: Vec<BlockSpec>,
    links: Vec<(LinkId, Port, Port)>,
    programs: &[Program],
) -> Result<Graph, DefinitionError> {
    let mut graph = Graph::new();

    for spec in specs {
        let schema = || {
            programs
                .iter()
                .find(|p| p.name == spec.kind)
                .ok_or_else(|| DefinitionError::UnknownSchema(spec.kind.clone()))
        };

        let inputs: Vec<LinkId> = match &spec.inputs {
            // Unconnected inputs carry no link and are skipped.
            Some(ins) => ins.iter().flatten().copied().collect(),
            None => {
                let arity = schema()?.input_arity();
                let mut by_slot: Vec<Option<LinkId>> = vec![None; arity];
                for (id, _, target) in links.iter().filter(|(_, _, t)| t.block == spec.id) {
                    let cell = by_slot.get_mut(target.slot).ok_or(
                        DefinitionError::SlotOutOfRange {
                            link: *id,
                            block: spec.id,
                            slot: target.slot,
                            arity,
                            side: "inputs",
                        },
                    )?;
                    *cell = Some(*id);
                }
                by_slot.into_iter().flatten().collect()
            }
        };

        let outputs: Vec<Vec<LinkId>> = match &spec.outputs {
            Some(outs) => outs.clone(),
            None => {
                let arity = schema()?.output_arity();
                let mut fan: Vec<Vec<LinkId>> = vec![Vec::new(); arity];
                for (id, source, _) in links.iter().filter(|(_, s, _)| s.block == spec.id) {
                    let cell = fan.get_mut(source.slot).ok_or(
                        DefinitionError::SlotOutOfRange {
                            link: *id,
                            block: spec.id,
                            slot: source.slot,
                            arity,
                            side: "outputs",
                        },
                    )?;
                    cell.push(*id);
                }
                fan
            }
        };

        graph.add_block(Block::new(spec.id, spec.kind, spec.properties, inputs, outputs))?;
    }

    for (id, source, target) in links {
        graph.add_link(id, source, target)?;
    }

    Ok(graph)
}
