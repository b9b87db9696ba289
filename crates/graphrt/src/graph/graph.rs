use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::node::{Node, NodeId};
use crate::error::{Result, RuntimeError};
use crate::kernel::SchemaRegistry;
use crate::tensor::{DType, Shape, Tensor};

/// Declared element type and (optionally) fully known shape of a graph value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub dtype: DType,
    pub shape: Option<Shape>,
}

impl TypeInfo {
    pub fn new(dtype: DType, shape: impl Into<Shape>) -> Self {
        Self {
            dtype,
            shape: Some(shape.into()),
        }
    }

    /// Type with a dtype but no static shape.
    pub fn dynamic(dtype: DType) -> Self {
        Self { dtype, shape: None }
    }

    pub fn of_tensor(tensor: &Tensor) -> Self {
        Self::new(tensor.dtype(), tensor.shape().clone())
    }

    /// Validates a concrete tensor against this declaration.
    pub fn check(&self, tensor: &Tensor, what: &str) -> Result<()> {
        if tensor.dtype() != self.dtype {
            return Err(RuntimeError::type_mismatch(format!(
                "{what} is {} but {} is declared",
                tensor.dtype(),
                self.dtype
            )));
        }
        if let Some(shape) = &self.shape {
            if tensor.shape() != shape {
                return Err(RuntimeError::shape_mismatch(format!(
                    "{what} has shape {} but {} is declared",
                    tensor.shape(),
                    shape
                )));
            }
        }
        Ok(())
    }
}

/// Mutable graph IR.
///
/// Nodes live in a table indexed by [`NodeId`]; removal leaves a hole so ids stay stable. Edges are
/// never stored as node references, only as name-keyed producer/consumer indices that every
/// mutation keeps current. Any mutation invalidates the topological order until
/// [`Graph::resolve`] runs again.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    name: String,
    nodes: Vec<Option<Node>>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    initializers: BTreeMap<String, Arc<Tensor>>,
    value_types: HashMap<String, TypeInfo>,
    producers: HashMap<String, NodeId>,
    consumers: HashMap<String, BTreeSet<NodeId>>,
    topo_order: Vec<NodeId>,
    resolved: bool,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares a graph-level input fed by the caller on every run.
    pub fn add_input(&mut self, name: impl Into<String>, type_info: TypeInfo) {
        let name = name.into();
        self.value_types.insert(name.clone(), type_info);
        if !self.inputs.contains(&name) {
            self.inputs.push(name);
        }
        self.resolved = false;
    }

    /// Declares a graph-level output fetched by the caller.
    pub fn add_output(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.outputs.contains(&name) {
            self.outputs.push(name);
        }
        self.resolved = false;
    }

    /// Adds a constant host tensor. Its type is taken from the tensor itself.
    pub fn add_initializer(&mut self, name: impl Into<String>, tensor: Tensor) {
        let name = name.into();
        self.value_types
            .insert(name.clone(), TypeInfo::of_tensor(&tensor));
        self.initializers.insert(name, Arc::new(tensor));
        self.resolved = false;
    }

    /// Records the declared type of any value, typically a node output.
    pub fn set_value_type(&mut self, name: impl Into<String>, type_info: TypeInfo) {
        self.value_types.insert(name.into(), type_info);
        self.resolved = false;
    }

    pub fn value_type(&self, name: &str) -> Option<&TypeInfo> {
        self.value_types.get(name)
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn initializers(&self) -> &BTreeMap<String, Arc<Tensor>> {
        &self.initializers
    }

    pub fn is_graph_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|input| input == name)
    }

    pub fn is_graph_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|output| output == name)
    }

    pub fn is_initializer(&self, name: &str) -> bool {
        self.initializers.contains_key(name)
    }

    /// True for names with a value before any node runs.
    pub fn is_external_value(&self, name: &str) -> bool {
        self.is_graph_input(name) || self.is_initializer(name)
    }

    /// True when `name` is produced, fed, or constant somewhere in the graph.
    pub fn has_value(&self, name: &str) -> bool {
        self.producers.contains_key(name)
            || self.is_external_value(name)
            || self.value_types.contains_key(name)
    }

    /// Inserts a node, assigning it a fresh id.
    ///
    /// Fails when one of its outputs already has a producer.
    pub fn add_node(&mut self, mut node: Node) -> Result<NodeId> {
        for output in node.outputs().iter().filter(|name| !name.is_empty()) {
            if let Some(existing) = self.producers.get(output) {
                return Err(RuntimeError::invalid_graph(format!(
                    "value '{output}' produced by both '{}' and '{}'",
                    self.nodes[existing.0]
                        .as_ref()
                        .map(Node::name)
                        .unwrap_or_default(),
                    node.name()
                )));
            }
        }
        let id = NodeId(self.nodes.len());
        node.set_id(id);
        self.index_node(&node);
        self.nodes.push(Some(node));
        self.resolved = false;
        Ok(id)
    }

    /// Removes a node and its edges from the indices.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        let node = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or_else(|| RuntimeError::invalid_graph(format!("node {id} does not exist")))?;
        for output in node.outputs() {
            if self.producers.get(output) == Some(&id) {
                self.producers.remove(output);
            }
        }
        for (_, input) in node.present_inputs() {
            self.drop_consumer(input, id);
        }
        self.resolved = false;
        Ok(node)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn require_node(&self, id: NodeId) -> Result<&Node> {
        self.node(id)
            .ok_or_else(|| RuntimeError::invalid_graph(format!("node {id} does not exist")))
    }

    /// Live nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn producer(&self, name: &str) -> Option<NodeId> {
        self.producers.get(name).copied()
    }

    /// Distinct nodes consuming `name`, in id order.
    pub fn consumers(&self, name: &str) -> Vec<NodeId> {
        self.consumers
            .get(name)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Points input `index` of `id` at `new_name`.
    pub fn set_node_input(&mut self, id: NodeId, index: usize, new_name: &str) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| RuntimeError::invalid_graph(format!("node {id} does not exist")))?;
        let slot = node.inputs_mut().get_mut(index).ok_or_else(|| {
            RuntimeError::invalid_graph(format!("node {id} has no input {index}"))
        })?;
        let old_name = std::mem::replace(slot, new_name.to_string());
        let still_consumes = node.inputs().iter().any(|input| input == &old_name);
        if !old_name.is_empty() && !still_consumes {
            self.drop_consumer(&old_name, id);
        }
        if !new_name.is_empty() {
            self.consumers
                .entry(new_name.to_string())
                .or_default()
                .insert(id);
        }
        self.resolved = false;
        Ok(())
    }

    /// Rewires every consumer of `old_name` to read `new_name`. Returns the consumers touched.
    pub fn replace_input_everywhere(&mut self, old_name: &str, new_name: &str) -> Result<usize> {
        let consumers = self.consumers(old_name);
        for &id in &consumers {
            let positions: Vec<usize> = self
                .require_node(id)?
                .inputs()
                .iter()
                .enumerate()
                .filter(|(_, input)| input.as_str() == old_name)
                .map(|(index, _)| index)
                .collect();
            for index in positions {
                self.set_node_input(id, index, new_name)?;
            }
        }
        Ok(consumers.len())
    }

    pub fn set_node_provider(&mut self, id: NodeId, provider: &str) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| RuntimeError::invalid_graph(format!("node {id} does not exist")))?;
        node.set_provider(provider);
        Ok(())
    }

    /// Drops the declared type of a value no longer present in the graph.
    pub fn forget_value(&mut self, name: &str) {
        if !self.has_value_reference(name) {
            self.value_types.remove(name);
        }
    }

    fn has_value_reference(&self, name: &str) -> bool {
        self.producers.contains_key(name)
            || self.consumers.get(name).is_some_and(|set| !set.is_empty())
            || self.is_external_value(name)
            || self.is_graph_output(name)
    }

    /// Whether the topological order reflects the current node table.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Order computed by the last successful [`Graph::resolve`].
    pub fn topological_order(&self) -> Result<&[NodeId]> {
        if !self.resolved {
            return Err(RuntimeError::usage(format!(
                "graph '{}' was modified and must be resolved before it is traversed",
                self.name
            )));
        }
        Ok(&self.topo_order)
    }

    /// Validates the graph and computes a deterministic topological order.
    ///
    /// Checks single producers, dangling references, declared types, operator arity for known
    /// operators, and acyclicity. Ready nodes are emitted lowest id first.
    pub fn resolve(&mut self, schemas: &SchemaRegistry) -> Result<()> {
        self.resolved = false;
        for node in self.nodes() {
            for output in node.outputs() {
                if output.is_empty() {
                    return Err(RuntimeError::invalid_graph(format!(
                        "node '{}' has an unnamed output",
                        node.name()
                    )));
                }
                if self.is_external_value(output) {
                    return Err(RuntimeError::invalid_graph(format!(
                        "node '{}' writes '{output}', which is a graph input or initializer",
                        node.name()
                    )));
                }
            }
            for (_, input) in node.present_inputs() {
                if !self.producers.contains_key(input) && !self.is_external_value(input) {
                    return Err(RuntimeError::invalid_graph(format!(
                        "node '{}' consumes '{input}', which nothing produces",
                        node.name()
                    )));
                }
            }
            for name in node
                .present_inputs()
                .map(|(_, name)| name)
                .chain(node.outputs().iter().map(String::as_str))
                .filter(|name| !name.is_empty())
            {
                if !self.value_types.contains_key(name) {
                    return Err(RuntimeError::invalid_graph(format!(
                        "value '{name}' used by node '{}' has no declared type",
                        node.name()
                    )));
                }
            }
            if let Some(schema) = schemas.get(node.op_type()) {
                schema.check_arity(node)?;
            }
        }
        for output in &self.outputs {
            if !self.producers.contains_key(output) && !self.is_external_value(output) {
                return Err(RuntimeError::invalid_graph(format!(
                    "graph output '{output}' is never produced"
                )));
            }
        }

        self.topo_order = self.kahn_order()?;
        self.resolved = true;
        Ok(())
    }

    fn kahn_order(&self) -> Result<Vec<NodeId>> {
        let mut in_degree: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut successors: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
        for node in self.nodes() {
            let deps: BTreeSet<NodeId> = node
                .present_inputs()
                .filter_map(|(_, input)| self.producers.get(input).copied())
                .collect();
            in_degree.insert(node.id(), deps.len());
            for dep in deps {
                successors.entry(dep).or_default().insert(node.id());
            }
        }

        let mut ready: BTreeSet<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for succ in successors.get(&id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(succ) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*succ);
                    }
                }
            }
        }

        if order.len() != in_degree.len() {
            let stuck = in_degree
                .iter()
                .find(|(_, degree)| **degree > 0)
                .and_then(|(id, _)| self.node(*id))
                .map(|node| node.name().to_string())
                .unwrap_or_default();
            return Err(RuntimeError::invalid_graph(format!(
                "graph '{}' contains a cycle through node '{stuck}'",
                self.name
            )));
        }
        Ok(order)
    }

    fn index_node(&mut self, node: &Node) {
        for output in node.outputs().iter().filter(|name| !name.is_empty()) {
            self.producers.insert(output.clone(), node.id());
        }
        for (_, input) in node.present_inputs() {
            self.consumers
                .entry(input.to_string())
                .or_default()
                .insert(node.id());
        }
    }

    fn drop_consumer(&mut self, name: &str, id: NodeId) {
        if let Some(set) = self.consumers.get_mut(name) {
            set.remove(&id);
            if set.is_empty() {
                self.consumers.remove(name);
            }
        }
    }
}
