#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use graphrt::alloc::{AllocatorMap, AllocatorPtr, ArenaAllocator, Device, HostAllocator, MemKind};
use graphrt::error::{Result, RuntimeError};
use graphrt::graph::{Graph, Node, NodeId, TypeInfo};
use graphrt::kernel::broadcast::BroadcastPlan;
use graphrt::kernel::{
    register_memcpy_kernels, ArgSelector, KernelDef, KernelRegistry, OpKernel, OpKernelContext,
    OpKernelInfo,
};
use graphrt::provider::{ExecutionProvider, ProviderPtr};
use graphrt::session::{InferenceSession, SessionOptions};
use graphrt::tensor::{copy_tensor_data, DType, Shape, Tensor};

pub const HOST: &str = "TestHostProvider";
pub const DEVICE: &str = "TestDeviceProvider";
pub const DEVICE_B: &str = "TestDeviceProviderB";

#[derive(Debug)]
pub struct TestProvider {
    provider_type: String,
    allocators: AllocatorMap,
    registry: Arc<KernelRegistry>,
    copies: AtomicUsize,
}

impl TestProvider {
    pub fn host() -> Arc<Self> {
        Self::host_with(ArenaAllocator::new("TestHost", Device::Cpu, MemKind::Default))
    }

    pub fn host_with(arena: ArenaAllocator) -> Arc<Self> {
        let mut allocators = AllocatorMap::new();
        allocators.insert(MemKind::Default, Arc::new(arena));
        Arc::new(Self::with_allocators(HOST, allocators, false))
    }

    pub fn device() -> Arc<Self> {
        Self::device_named(DEVICE, 7)
    }

    pub fn device_named(provider_type: &str, id: u16) -> Arc<Self> {
        let mut allocators = AllocatorMap::new();
        allocators.insert(
            MemKind::Default,
            Arc::new(ArenaAllocator::new(
                format!("{provider_type}Device"),
                Device::Accelerator(id),
                MemKind::Default,
            )),
        );
        allocators.insert(
            MemKind::HostInput,
            Arc::new(HostAllocator::new(format!("{provider_type}HostIn"), MemKind::HostInput)),
        );
        allocators.insert(
            MemKind::HostOutput,
            Arc::new(ArenaAllocator::new(
                format!("{provider_type}Pinned"),
                Device::Cpu,
                MemKind::HostOutput,
            )),
        );
        Arc::new(Self::with_allocators(provider_type, allocators, true))
    }

    fn with_allocators(provider_type: &str, allocators: AllocatorMap, memcpy: bool) -> Self {
        let mut registry = KernelRegistry::new();
        register_test_kernels(&mut registry, provider_type).expect("test kernels register");
        if memcpy {
            register_memcpy_kernels(&mut registry, provider_type).expect("memcpy kernels register");
        }
        Self {
            provider_type: provider_type.to_string(),
            allocators,
            registry: Arc::new(registry),
            copies: AtomicUsize::new(0),
        }
    }

    pub fn copy_count(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    pub fn default_allocator(&self) -> AllocatorPtr {
        self.allocators
            .get(MemKind::Default)
            .expect("default allocator")
    }
}

impl ExecutionProvider for TestProvider {
    fn provider_type(&self) -> &str {
        &self.provider_type
    }

    fn allocators(&self) -> &AllocatorMap {
        &self.allocators
    }

    fn kernel_registry(&self) -> Arc<KernelRegistry> {
        Arc::clone(&self.registry)
    }

    fn copy_tensor(&self, src: &Tensor, dst: &mut Tensor) -> Result<()> {
        self.copies.fetch_add(1, Ordering::SeqCst);
        copy_tensor_data(src, dst)
    }
}

struct AddKernel;

impl OpKernel for AddKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let a = ctx.input(0)?;
        let b = ctx.input(1)?;
        let plan = BroadcastPlan::new(&[a.shape(), b.shape()])?;
        let (lhs, rhs) = (a.data::<f32>()?, b.data::<f32>()?);
        let out = ctx.output(0, plan.output_shape().clone())?;
        for (i, value) in out.data_mut::<f32>()?.iter_mut().enumerate() {
            *value = lhs[plan.source_index(0, i)] + rhs[plan.source_index(1, i)];
        }
        Ok(())
    }
}

struct ScaleKernel {
    factor: f32,
}

impl OpKernel for ScaleKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let x = ctx.input(0)?;
        let out = ctx.output(0, x.shape().clone())?;
        for (dst, src) in out.data_mut::<f32>()?.iter_mut().zip(x.data::<f32>()?) {
            *dst = src * self.factor;
        }
        Ok(())
    }
}

struct PassThroughKernel;

impl OpKernel for PassThroughKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let x = ctx.input(0)?;
        let out = ctx.output(0, x.shape().clone())?;
        copy_tensor_data(&x, out)
    }
}

/// Fails whenever its first input element is negative.
struct GuardKernel;

impl OpKernel for GuardKernel {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let x = ctx.input(0)?;
        if x.data::<f32>()?.first().is_some_and(|v| *v < 0.0) {
            return Err(RuntimeError::device(
                ctx.provider().provider_type(),
                "guard tripped on negative input",
            ));
        }
        let out = ctx.output(0, x.shape().clone())?;
        copy_tensor_data(&x, out)
    }
}

fn f32_only() -> [ArgSelector; 2] {
    [ArgSelector::AllInputs, ArgSelector::AllOutputs]
}

pub fn register_test_kernels(registry: &mut KernelRegistry, provider: &str) -> Result<()> {
    registry.register(
        KernelDef::builder("Add", provider)
            .since_version(1)
            .type_constraint("T", [DType::F32], f32_only())
            .broadcast_inputs()
            .build(),
        |_| Ok(Box::new(AddKernel)),
    )?;
    registry.register(
        KernelDef::builder("Scale", provider)
            .type_constraint("T", [DType::F32], f32_only())
            .build(),
        |info: &OpKernelInfo| {
            Ok(Box::new(ScaleKernel {
                factor: info.attr_or("factor", 1.0f32)?,
            }))
        },
    )?;
    for op in ["Identity", "Slice"] {
        registry.register(
            KernelDef::builder(op, provider)
                .type_constraint("T", [DType::F32], f32_only())
                .build(),
            |_| Ok(Box::new(PassThroughKernel)),
        )?;
    }
    registry.register(
        KernelDef::builder("Guard", provider)
            .type_constraint("T", [DType::F32], f32_only())
            .build(),
        |_| Ok(Box::new(GuardKernel)),
    )?;
    Ok(())
}

pub fn f32_info(dims: &[usize]) -> TypeInfo {
    TypeInfo::new(DType::F32, Shape::new(dims))
}

/// Adds `node` to `graph`, declaring every output as float32 with `dims`.
pub fn push_node(graph: &mut Graph, node: Node, dims: &[usize]) -> NodeId {
    for output in node.outputs() {
        graph.set_value_type(output.clone(), f32_info(dims));
    }
    graph.add_node(node).expect("node added")
}

pub fn vector(values: &[f32]) -> Tensor {
    Tensor::from_vec([values.len()], values.to_vec()).expect("host tensor")
}

/// x -> Scale(2) -> a -> Add(a, x) -> y
pub fn scale_add_graph() -> Graph {
    let mut graph = Graph::new("scale_add");
    graph.add_input("x", f32_info(&[4]));
    push_node(
        &mut graph,
        Node::new("scale", "Scale")
            .with_inputs(["x"])
            .with_outputs(["a"])
            .with_attribute("factor", 2.0f32),
        &[4],
    );
    push_node(
        &mut graph,
        Node::new("add", "Add").with_inputs(["a", "x"]).with_outputs(["y"]),
        &[4],
    );
    graph.add_output("y");
    graph
}

pub fn initialized_session(
    options: SessionOptions,
    providers: Vec<ProviderPtr>,
    graph: Graph,
) -> InferenceSession {
    let mut session = InferenceSession::new(options);
    for provider in providers {
        session.register_provider(provider).expect("provider registers");
    }
    session.load(graph).expect("graph loads");
    session.initialize().expect("session initializes");
    session
}
