use super::rule::{RewriteEffect, RewriteRule};
use crate::error::Result;
use crate::graph::utils::{is_single_in_single_out, remove_single_in_single_out_node, repeated_attribute};
use crate::graph::{Graph, Node, NodeId};

/// Removes `Slice` nodes that keep every element of their input.
///
/// A slice is a no-op only when every start is `0` and every end is either `-1` or at least
/// `i64::MAX`. Static input shapes are not consulted, so an end equal to the actual dimension is
/// kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct EliminateSlice;

impl EliminateSlice {
    fn is_noop(node: &Node) -> bool {
        let (Some(starts), Some(ends)) = (
            repeated_attribute::<i64>(node, "starts"),
            repeated_attribute::<i64>(node, "ends"),
        ) else {
            return false;
        };
        if starts.len() != ends.len() {
            return false;
        }
        if let Some(axes) = repeated_attribute::<i64>(node, "axes") {
            if axes.len() != starts.len() {
                return false;
            }
        }
        starts.iter().all(|&start| start == 0)
            && ends.iter().all(|&end| end == -1 || end == i64::MAX)
    }
}

impl RewriteRule for EliminateSlice {
    fn name(&self) -> &'static str {
        "EliminateSlice"
    }

    fn op_type(&self) -> &'static str {
        "Slice"
    }

    fn satisfy_condition(&self, graph: &Graph, node: &Node) -> bool {
        is_single_in_single_out(node)
            && !graph.is_graph_output(&node.outputs()[0])
            && Self::is_noop(node)
    }

    fn apply(&self, graph: &mut Graph, node: NodeId) -> Result<RewriteEffect> {
        if remove_single_in_single_out_node(graph, node)? {
            Ok(RewriteEffect::NodeRemoved)
        } else {
            Ok(RewriteEffect::Unchanged)
        }
    }
}
