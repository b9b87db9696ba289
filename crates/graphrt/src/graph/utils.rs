//! Helpers shared by graph rewrites.

use super::attribute::FromAttribute;
use super::graph::Graph;
use super::node::{Node, NodeId};
use crate::error::Result;

/// Exactly one supplied input and exactly one output.
pub fn is_single_in_single_out(node: &Node) -> bool {
    node.inputs().len() == 1
        && !node.inputs()[0].is_empty()
        && node.outputs().len() == 1
        && !node.outputs()[0].is_empty()
}

/// Reads a list-valued attribute, returning `None` when absent or of another kind.
pub fn repeated_attribute<T>(node: &Node, name: &str) -> Option<Vec<T>>
where
    Vec<T>: FromAttribute,
{
    node.attribute(name).and_then(Vec::<T>::from_attribute)
}

/// Removes a single-input/single-output node and rewires its consumers to its input.
///
/// Returns `Ok(false)` without touching the graph when the node does not have that shape or when
/// its output is a graph output, since the output name must stay observable to callers.
pub fn remove_single_in_single_out_node(graph: &mut Graph, id: NodeId) -> Result<bool> {
    let node = graph.require_node(id)?;
    if !is_single_in_single_out(node) {
        return Ok(false);
    }
    let input = node.inputs()[0].clone();
    let output = node.outputs()[0].clone();
    if graph.is_graph_output(&output) {
        return Ok(false);
    }

    graph.replace_input_everywhere(&output, &input)?;
    graph.remove_node(id)?;
    graph.forget_value(&output);
    Ok(true)
}
