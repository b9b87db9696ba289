use std::sync::Arc;

use super::executor::SequentialExecutor;
use super::frame::ExecutionFrame;
use super::options::{OptimizationLevel, SessionOptions};
use super::state::SessionState;
use crate::alloc::host_allocator;
use crate::error::{Result, RuntimeError};
use crate::graph::Graph;
use crate::kernel::{KernelRegistryManager, OpSchema, SchemaRegistry};
use crate::provider::{ExecutionProviders, ProviderPtr};
use crate::tensor::{copy_tensor_data, Tensor};
use crate::transform::{
    EliminateIdentity, EliminateSlice, MemcpyTransformer, PipelineBuilder, PipelineReport,
    RuleBasedTransformer, TransformerPipeline,
};

/// Loads one graph, prepares it for a set of providers, and runs it repeatedly.
///
/// Configuration (`register_provider`, `register_schema`, `load`) happens before
/// [`InferenceSession::initialize`]. After that the session is read-only and `run` may be called
/// from several threads at once; each call gets its own [`ExecutionFrame`].
#[derive(Debug)]
pub struct InferenceSession {
    options: SessionOptions,
    providers: ExecutionProviders,
    schemas: SchemaRegistry,
    graph: Option<Graph>,
    state: Option<SessionState>,
    optimization_report: Option<PipelineReport>,
    memcpy_report: Option<PipelineReport>,
}

impl InferenceSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            providers: ExecutionProviders::new(),
            schemas: SchemaRegistry::builtin().clone(),
            graph: None,
            state: None,
            optimization_report: None,
            memcpy_report: None,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Attaches a provider. Earlier registrations take priority in placement.
    pub fn register_provider(&mut self, provider: ProviderPtr) -> Result<()> {
        self.ensure_configurable("register a provider")?;
        self.providers.add(provider)
    }

    pub fn register_schema(&mut self, schema: OpSchema) -> Result<()> {
        self.ensure_configurable("register a schema")?;
        self.schemas.register(schema);
        Ok(())
    }

    pub fn load(&mut self, graph: Graph) -> Result<()> {
        self.ensure_configurable("load a graph")?;
        self.graph = Some(graph);
        Ok(())
    }

    pub fn providers(&self) -> &ExecutionProviders {
        &self.providers
    }

    /// The loaded graph; after initialization, the optimized and placed graph.
    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn optimization_report(&self) -> Option<&PipelineReport> {
        self.optimization_report.as_ref()
    }

    pub fn memcpy_report(&self) -> Option<&PipelineReport> {
        self.memcpy_report.as_ref()
    }

    pub fn state(&self) -> Result<&SessionState> {
        self.state
            .as_ref()
            .ok_or_else(|| RuntimeError::usage("session is not initialized"))
    }

    /// Validates, optimizes, places and binds the loaded graph.
    ///
    /// On failure the session keeps the graph as loaded and stays uninitialized.
    pub fn initialize(&mut self) -> Result<()> {
        self.ensure_configurable("initialize")?;
        if self.providers.is_empty() {
            return Err(RuntimeError::usage("no execution providers registered"));
        }
        let mut graph = self
            .graph
            .clone()
            .ok_or_else(|| RuntimeError::usage("no graph loaded"))?;
        graph.resolve(&self.schemas)?;

        let optimization_report = match self.options.optimization_level {
            OptimizationLevel::Disabled => None,
            OptimizationLevel::Basic => {
                let mut builder = PipelineBuilder::new();
                builder.pass(Arc::new(
                    RuleBasedTransformer::new("RedundantNodeElimination")
                        .with_rule(EliminateIdentity)
                        .with_rule(EliminateSlice),
                ));
                let pipeline =
                    TransformerPipeline::new(builder.finish(), self.options.max_transform_sweeps)
                        .with_dump_ir(self.options.dump_ir);
                Some(pipeline.run(&mut graph, &self.schemas)?)
            }
        };

        let registries = KernelRegistryManager::from_providers(&self.providers);
        place_nodes(&mut graph, &registries)?;

        let mut builder = PipelineBuilder::new();
        builder.pass(Arc::new(MemcpyTransformer::new(
            self.providers.clone(),
            registries.clone(),
        )));
        // The second sweep only confirms the copies are stable.
        let memcpy_report = TransformerPipeline::new(builder.finish(), 2)
            .with_dump_ir(self.options.dump_ir)
            .run(&mut graph, &self.schemas)?;

        let state = SessionState::build(&graph, &self.providers, &registries)?;
        tracing::debug!(
            graph = graph.name(),
            nodes = graph.node_count(),
            copies = memcpy_report.result.nodes_inserted,
            "session initialized"
        );

        self.graph = Some(graph);
        self.state = Some(state);
        self.optimization_report = optimization_report;
        self.memcpy_report = Some(memcpy_report);
        Ok(())
    }

    /// Runs the graph and returns the requested outputs as host tensors.
    pub fn run<K, I>(&self, feeds: I, output_names: &[&str]) -> Result<Vec<Tensor>>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Tensor)>,
    {
        let frame = self.run_with_frame(feeds)?;
        output_names
            .iter()
            .map(|name| self.fetch_to_host(&frame, name))
            .collect()
    }

    /// Runs the graph and hands back the finished frame for inspection.
    pub fn run_with_frame<K, I>(&self, feeds: I) -> Result<ExecutionFrame<'_>>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Tensor)>,
    {
        let state = self.state()?;
        for provider in self.providers.iter() {
            provider.on_run_start()?;
        }

        let mut frame = ExecutionFrame::new(state, self.options.release_intermediates_early);
        let outcome = bind_and_execute(&mut frame, feeds);

        let mut end = Ok(());
        for provider in self.providers.iter() {
            let result = provider.on_run_end();
            if end.is_ok() {
                end = result;
            }
        }
        outcome?;
        end?;
        Ok(frame)
    }

    /// Copies graph output `name` out of `frame` into a fresh host tensor.
    pub fn fetch_to_host(&self, frame: &ExecutionFrame<'_>, name: &str) -> Result<Tensor> {
        let state = self.state()?;
        let slot = state
            .slot_index(name)
            .filter(|slot| state.output_slots().contains(slot))
            .ok_or_else(|| RuntimeError::UnknownOutput(name.to_string()))?;
        let src = frame.fetch(name)?;
        let mut dst = Tensor::allocate(src.dtype(), src.shape().clone(), &host_allocator())?;
        let on_host = src.location().is_some_and(|info| info.device.is_host());
        match &state.slot(slot).producer {
            Some(provider) if !on_host => {
                provider.sync()?;
                provider.copy_tensor(&src, &mut dst)?;
            }
            _ => copy_tensor_data(&src, &mut dst)?,
        }
        Ok(dst)
    }

    fn ensure_configurable(&self, action: &str) -> Result<()> {
        if self.state.is_some() {
            return Err(RuntimeError::usage(format!(
                "cannot {action} after the session is initialized"
            )));
        }
        Ok(())
    }
}

fn bind_and_execute<K, I>(frame: &mut ExecutionFrame<'_>, feeds: I) -> Result<()>
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, Tensor)>,
{
    for (name, tensor) in feeds {
        frame.bind_input(name.as_ref(), tensor)?;
    }
    frame.ensure_inputs_bound()?;
    SequentialExecutor.execute(frame)
}

/// Assigns every unplaced node to the highest-priority provider with a matching kernel.
fn place_nodes(graph: &mut Graph, registries: &KernelRegistryManager) -> Result<()> {
    let order = graph.topological_order()?.to_vec();
    for id in order {
        let node = graph.require_node(id)?;
        if node.provider().is_some() {
            continue;
        }
        let (provider, _) = registries.search_kernel(node, graph)?;
        tracing::debug!(node = node.name(), op = node.op_type(), provider = %provider, "placed node");
        graph.set_node_provider(id, &provider)?;
    }
    Ok(())
}
