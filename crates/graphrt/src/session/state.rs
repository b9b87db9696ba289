use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::alloc::MemKind;
use crate::error::{Result, RuntimeError};
use crate::graph::{Graph, NodeId, TypeInfo};
use crate::kernel::{KernelRegistryManager, OpKernel, OpKernelInfo, OutputSpec};
use crate::provider::{ExecutionProviders, ProviderPtr};
use crate::tensor::Tensor;

/// Role of a frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Fed by the caller.
    Input,
    /// Constant bound when the frame is created.
    Initializer,
    /// Produced and consumed inside the graph; released once its consumers ran.
    Intermediate,
    /// Produced by a node and fetched by the caller; never released early.
    Output,
}

#[derive(Debug, Clone)]
pub struct SlotInfo {
    pub name: String,
    pub kind: SlotKind,
    pub type_info: TypeInfo,
    /// Number of distinct nodes reading the slot.
    pub consumers: usize,
    /// Provider of the node writing the slot; `None` for inputs and initializers.
    pub producer: Option<ProviderPtr>,
}

/// One node of the execution plan, bound to its kernel.
pub struct ExecutionStep {
    pub node_id: NodeId,
    pub node_name: String,
    pub op_type: String,
    pub provider: ProviderPtr,
    pub kernel: Box<dyn OpKernel>,
    pub info: OpKernelInfo,
    pub input_slots: Vec<Option<usize>>,
    pub output_slots: Vec<usize>,
    pub output_specs: Vec<OutputSpec>,
    pub broadcast_inputs: bool,
}

impl fmt::Debug for ExecutionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionStep")
            .field("node", &self.node_name)
            .field("op_type", &self.op_type)
            .field("provider", &self.provider.provider_type())
            .field("input_slots", &self.input_slots)
            .field("output_slots", &self.output_slots)
            .finish()
    }
}

/// Read-only result of binding a resolved, placed graph to kernels.
///
/// Every value name maps to a slot index that stays fixed for the session's lifetime. The plan
/// lists nodes in topological order with their kernels and slot indices, so a run never touches
/// the graph itself.
#[derive(Debug)]
pub struct SessionState {
    name_to_slot: HashMap<String, usize>,
    slots: Vec<SlotInfo>,
    input_slots: Vec<usize>,
    output_slots: Vec<usize>,
    initializers: Vec<(usize, Arc<Tensor>)>,
    plan: Vec<ExecutionStep>,
}

impl SessionState {
    /// Binds every node of `graph` to a kernel on its assigned provider.
    pub fn build(
        graph: &Graph,
        providers: &ExecutionProviders,
        registries: &KernelRegistryManager,
    ) -> Result<Self> {
        let order = graph.topological_order()?.to_vec();
        let mut builder = SlotTableBuilder::new(graph);
        for name in graph.inputs() {
            builder.slot(name, SlotKind::Input, None)?;
        }
        for name in graph.initializers().keys() {
            builder.slot(name, SlotKind::Initializer, None)?;
        }

        let mut plan = Vec::with_capacity(order.len());
        for id in order {
            let node = graph.require_node(id)?;
            let provider_type = node.provider().ok_or_else(|| {
                RuntimeError::usage(format!("node '{}' was never placed", node.name()))
            })?;
            let provider = ProviderPtr::clone(providers.require(provider_type)?);
            let (_, create_info) = registries.search_kernel(node, graph)?;
            let def = &create_info.def;

            let input_slots = node
                .inputs()
                .iter()
                .map(|name| {
                    if name.is_empty() {
                        Ok(None)
                    } else {
                        builder.existing(name).map(Some)
                    }
                })
                .collect::<Result<Vec<_>>>()?;

            let mut output_slots = Vec::with_capacity(node.outputs().len());
            let mut output_specs = Vec::with_capacity(node.outputs().len());
            for (index, name) in node.outputs().iter().enumerate() {
                let kind = if graph.is_graph_output(name) {
                    SlotKind::Output
                } else {
                    SlotKind::Intermediate
                };
                let slot = builder.slot(name, kind, Some(ProviderPtr::clone(&provider)))?;
                let mem_kind = def.output_mem_kind(index);
                let allocator = provider
                    .allocator(mem_kind)
                    .or_else(|| provider.allocator(MemKind::Default))
                    .ok_or_else(|| {
                        RuntimeError::usage(format!(
                            "provider {provider_type} has no allocator for {mem_kind:?}"
                        ))
                    })?;
                output_specs.push(OutputSpec {
                    dtype: builder.slots[slot].type_info.dtype,
                    allocator,
                });
                output_slots.push(slot);
            }

            let info = OpKernelInfo::new(node, def, ProviderPtr::clone(&provider), graph);
            let kernel = (create_info.create)(&info)
                .map_err(|err| err.in_kernel_creation(node.name(), node.op_type()))?;
            plan.push(ExecutionStep {
                node_id: id,
                node_name: node.name().to_string(),
                op_type: node.op_type().to_string(),
                provider,
                kernel,
                info,
                input_slots,
                output_slots,
                output_specs,
                broadcast_inputs: def.broadcast_inputs(),
            });
        }

        let SlotTableBuilder {
            slots,
            name_to_slot,
            ..
        } = builder;
        let lookup = |name: &String| {
            name_to_slot.get(name).copied().ok_or_else(|| {
                RuntimeError::invalid_graph(format!("value '{name}' has no slot"))
            })
        };
        let input_slots = graph.inputs().iter().map(lookup).collect::<Result<Vec<_>>>()?;
        let output_slots = graph.outputs().iter().map(lookup).collect::<Result<Vec<_>>>()?;
        let initializers = graph
            .initializers()
            .iter()
            .map(|(name, tensor)| Ok((lookup(name)?, Arc::clone(tensor))))
            .collect::<Result<Vec<_>>>()?;

        let mut per_provider: BTreeMap<&str, usize> = BTreeMap::new();
        for step in &plan {
            *per_provider.entry(step.provider.provider_type()).or_default() += 1;
        }
        tracing::debug!(
            graph = graph.name(),
            nodes = plan.len(),
            slots = slots.len(),
            placement = ?per_provider,
            "session state built"
        );

        Ok(Self {
            name_to_slot,
            slots,
            input_slots,
            output_slots,
            initializers,
            plan,
        })
    }

    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.name_to_slot.get(name).copied()
    }

    pub fn slot(&self, index: usize) -> &SlotInfo {
        &self.slots[index]
    }

    pub fn slots(&self) -> &[SlotInfo] {
        &self.slots
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn input_slots(&self) -> &[usize] {
        &self.input_slots
    }

    pub fn output_slots(&self) -> &[usize] {
        &self.output_slots
    }

    pub fn initializers(&self) -> &[(usize, Arc<Tensor>)] {
        &self.initializers
    }

    pub fn plan(&self) -> &[ExecutionStep] {
        &self.plan
    }
}

struct SlotTableBuilder<'g> {
    graph: &'g Graph,
    slots: Vec<SlotInfo>,
    name_to_slot: HashMap<String, usize>,
}

impl<'g> SlotTableBuilder<'g> {
    fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            slots: Vec::new(),
            name_to_slot: HashMap::new(),
        }
    }

    fn slot(&mut self, name: &str, kind: SlotKind, producer: Option<ProviderPtr>) -> Result<usize> {
        if let Some(index) = self.name_to_slot.get(name) {
            return Ok(*index);
        }
        let type_info = self.graph.value_type(name).cloned().ok_or_else(|| {
            RuntimeError::invalid_graph(format!("value '{name}' has no declared type"))
        })?;
        let index = self.slots.len();
        self.slots.push(SlotInfo {
            name: name.to_string(),
            kind,
            type_info,
            consumers: self.graph.consumers(name).len(),
            producer,
        });
        self.name_to_slot.insert(name.to_string(), index);
        Ok(index)
    }

    fn existing(&self, name: &str) -> Result<usize> {
        self.name_to_slot.get(name).copied().ok_or_else(|| {
            RuntimeError::invalid_graph(format!("value '{name}' is read before it is produced"))
        })
    }
}
