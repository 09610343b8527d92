// src/dag/mod.rs

//! Blueprint graphs.
//!
//! - [`graph`] holds blocks, links and the frontier query.
//! - [`definition`] turns blueprint JSON (plus program schemas) into a graph.
//! - [`template`] substitutes judgement-scoped tokens before parsing.
//! - [`validate`] checks wiring and acyclicity after parsing.

pub mod definition;
pub mod graph;
pub mod template;
pub mod validate;

pub use definition::{DefinitionError, parse_definition};
pub use graph::{
    Block, BlockId, BlockStatus, Graph, GraphError, Link, LinkId, Port, Properties,
};
pub use template::{TemplateContext, Token, substitute};
pub use validate::validate_graph;

use crate::model::Program;

/// Substitute tokens in `definition` and parse the result.
pub fn build_graph(
    definition: &str,
    ctx: &TemplateContext,
    programs: &[Program],
) -> Result<Graph, DefinitionError> {
    let text = substitute(definition, ctx)?;
    parse_definition(&text, programs)
}
