use serde::{Deserialize, Serialize};

use super::attribute::Attributes;
use super::graph::{Graph, TypeInfo};
use super::node::NodeId;
use crate::error::Result;

/// Serializable view of a graph, used for IR dumps and test assertions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub name: String,
    pub inputs: Vec<ValueSnapshot>,
    pub outputs: Vec<String>,
    pub initializers: Vec<ValueSnapshot>,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSnapshot {
    pub name: String,
    pub type_info: Option<TypeInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub op_type: String,
    pub version: u32,
    pub provider: Option<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: Attributes,
}

impl GraphSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Graph {
    /// Captures the graph. Nodes follow the topological order when resolved, id order otherwise.
    pub fn snapshot(&self) -> GraphSnapshot {
        let value = |name: &String| ValueSnapshot {
            name: name.clone(),
            type_info: self.value_type(name).cloned(),
        };
        let order: Vec<NodeId> = match self.topological_order() {
            Ok(order) => order.to_vec(),
            Err(_) => self.nodes().map(|node| node.id()).collect(),
        };
        GraphSnapshot {
            name: self.name().to_string(),
            inputs: self.inputs().iter().map(value).collect(),
            outputs: self.outputs().to_vec(),
            initializers: self.initializers().keys().map(value).collect(),
            nodes: order
                .into_iter()
                .filter_map(|id| self.node(id))
                .map(|node| NodeSnapshot {
                    id: node.id(),
                    name: node.name().to_string(),
                    op_type: node.op_type().to_string(),
                    version: node.version(),
                    provider: node.provider().map(str::to_string),
                    inputs: node.inputs().to_vec(),
                    outputs: node.outputs().to_vec(),
                    attributes: node.attributes().clone(),
                })
                .collect(),
        }
    }
}
