use std::collections::HashMap;

use super::{GraphTransformer, TransformResult};
use crate::alloc::{Device, MemKind};
use crate::error::{Result, RuntimeError};
use crate::graph::{Graph, Node};
use crate::kernel::{KernelRegistryManager, MEMCPY_FROM_HOST, MEMCPY_TO_HOST};
use crate::provider::ExecutionProviders;

/// Inserts copy nodes on every edge whose producer and consumer see the value in different
/// physical memory.
///
/// The location of an argument is the device of the allocator its node's provider registered for
/// the memory kind the kernel declares for that argument. Graph inputs and initializers live on
/// the host. Host-to-device copies run on the consuming provider, device-to-host copies on the
/// producing provider, and device-to-device edges are routed through the host. One copy is shared
/// by all consumers that need the same value on the same device.
pub struct MemcpyTransformer {
    providers: ExecutionProviders,
    registries: KernelRegistryManager,
}

impl MemcpyTransformer {
    pub fn new(providers: ExecutionProviders, registries: KernelRegistryManager) -> Self {
        Self {
            providers,
            registries,
        }
    }

    fn location(&self, provider_type: &str, mem_kind: MemKind) -> Result<Device> {
        let provider = self.providers.require(provider_type)?;
        let allocator = provider
            .allocator(mem_kind)
            .or_else(|| provider.allocator(MemKind::Default))
            .ok_or_else(|| {
                RuntimeError::usage(format!("provider {provider_type} has no allocators"))
            })?;
        Ok(allocator.info().device)
    }

    fn assigned_provider<'g>(&self, node: &'g Node) -> Result<&'g str> {
        node.provider().ok_or_else(|| {
            RuntimeError::usage(format!(
                "node '{}' has no provider; placement must run before copy insertion",
                node.name()
            ))
        })
    }

    /// Where `name` lives when its producer writes it.
    fn value_location(&self, graph: &Graph, name: &str) -> Result<(Device, Option<String>)> {
        let Some(producer) = graph.producer(name) else {
            return Ok((Device::Cpu, None));
        };
        let node = graph.require_node(producer)?;
        let provider = self.assigned_provider(node)?;
        let (_, info) = self.registries.search_kernel(node, graph)?;
        let index = node
            .outputs()
            .iter()
            .position(|output| output == name)
            .unwrap_or_default();
        let device = self.location(provider, info.def.output_mem_kind(index))?;
        Ok((device, Some(provider.to_string())))
    }
}

struct CopyPlanner<'a> {
    copies: HashMap<(String, Device), String>,
    result: &'a mut TransformResult,
}

impl CopyPlanner<'_> {
    /// Returns the name under which `name` is available on `dst`, inserting copies as needed.
    fn route(
        &mut self,
        graph: &mut Graph,
        name: &str,
        src: (Device, Option<&str>),
        dst: Device,
        consumer_provider: &str,
    ) -> Result<String> {
        if let Some(existing) = self.copies.get(&(name.to_string(), dst)) {
            return Ok(existing.clone());
        }
        let (src_device, src_provider) = src;
        let routed = match (src_device.is_host(), dst.is_host()) {
            (true, false) => self.insert_copy(graph, MEMCPY_FROM_HOST, name, consumer_provider)?,
            (false, true) => {
                let provider = src_provider.ok_or_else(|| {
                    RuntimeError::invalid_graph(format!(
                        "value '{name}' is on {src_device} without a producing provider"
                    ))
                })?;
                self.insert_copy(graph, MEMCPY_TO_HOST, name, provider)?
            }
            _ => {
                let staged = self.route(graph, name, src, Device::Cpu, consumer_provider)?;
                self.route(graph, &staged, (Device::Cpu, None), dst, consumer_provider)?
            }
        };
        self.copies.insert((name.to_string(), dst), routed.clone());
        Ok(routed)
    }

    fn insert_copy(
        &mut self,
        graph: &mut Graph,
        op_type: &str,
        input: &str,
        provider: &str,
    ) -> Result<String> {
        let type_info = graph.value_type(input).cloned().ok_or_else(|| {
            RuntimeError::invalid_graph(format!("value '{input}' has no declared type"))
        })?;
        let base = format!("{input}_{op_type}");
        let mut output = base.clone();
        let mut suffix = 1usize;
        while graph.has_value(&output) {
            output = format!("{base}_{suffix}");
            suffix += 1;
        }

        let node = Node::new(format!("{op_type}:{output}"), op_type)
            .with_inputs([input])
            .with_outputs([output.as_str()])
            .with_provider(provider);
        graph.set_value_type(output.clone(), type_info);
        graph.add_node(node)?;
        self.result.modified = true;
        self.result.nodes_inserted += 1;
        tracing::debug!(op = op_type, provider, from = input, to = %output, "inserted copy node");
        Ok(output)
    }
}

impl GraphTransformer for MemcpyTransformer {
    fn name(&self) -> &'static str {
        "MemcpyTransformer"
    }

    fn apply(&self, graph: &mut Graph) -> Result<TransformResult> {
        let order = graph.topological_order()?.to_vec();
        let mut result = TransformResult::default();
        let mut planner = CopyPlanner {
            copies: HashMap::new(),
            result: &mut result,
        };

        for id in order {
            let node = graph.require_node(id)?.clone();
            let consumer_provider = self.assigned_provider(&node)?;
            let (_, info) = self.registries.search_kernel(&node, graph)?;
            for (index, name) in node.present_inputs() {
                let dst = self.location(consumer_provider, info.def.input_mem_kind(index))?;
                let (src, src_provider) = self.value_location(graph, name)?;
                if src == dst {
                    continue;
                }
                let routed = planner.route(
                    graph,
                    name,
                    (src, src_provider.as_deref()),
                    dst,
                    consumer_provider,
                )?;
                graph.set_node_input(id, index, &routed)?;
            }
        }
        Ok(result)
    }
}
