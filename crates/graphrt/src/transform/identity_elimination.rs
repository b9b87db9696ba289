use super::rule::{RewriteEffect, RewriteRule};
use crate::error::Result;
use crate::graph::utils::{is_single_in_single_out, remove_single_in_single_out_node};
use crate::graph::{Graph, Node, NodeId};

/// Removes `Identity` nodes whose output is not a graph output.
#[derive(Debug, Default, Clone, Copy)]
pub struct EliminateIdentity;

impl RewriteRule for EliminateIdentity {
    fn name(&self) -> &'static str {
        "EliminateIdentity"
    }

    fn op_type(&self) -> &'static str {
        "Identity"
    }

    fn satisfy_condition(&self, graph: &Graph, node: &Node) -> bool {
        is_single_in_single_out(node) && !graph.is_graph_output(&node.outputs()[0])
    }

    fn apply(&self, graph: &mut Graph, node: NodeId) -> Result<RewriteEffect> {
        if remove_single_in_single_out_node(graph, node)? {
            Ok(RewriteEffect::NodeRemoved)
        } else {
            Ok(RewriteEffect::Unchanged)
        }
    }
}
