use std::sync::Arc;

use anyhow::Result;
use graphrt::alloc::{Device, MemKind};
use graphrt::graph::{Graph, Node, TypeInfo};
use graphrt::kernel::{is_memcpy_op, MEMCPY_FROM_HOST, MEMCPY_TO_HOST};
use graphrt::session::{InferenceSession, SessionOptions};
use graphrt::{DType, ExecutionProvider, ProviderPtr, RuntimeError, Tensor};
use graphrt_provider_cpu::{CpuExecutionProvider, CPU_PROVIDER};
use graphrt_provider_sim::{SimDevice, SimExecutionProvider, SimStats, SIM_PROVIDER};

/// `y = Clip(Gemm(x, W, b), -5, 10)`, optionally pinning the Gemm to one provider.
fn dense_clip_graph(gemm_provider: Option<&str>) -> Result<Graph> {
    let mut graph = Graph::new("dense_clip");
    graph.add_input("x", TypeInfo::new(DType::F32, [2, 4]));
    graph.add_initializer("W", Tensor::from_vec([4, 3], vec![1.0f32; 12])?);
    graph.add_initializer("b", Tensor::from_vec([3], vec![1.0f32; 3])?);
    graph.set_value_type("g", TypeInfo::new(DType::F32, [2, 3]));
    graph.set_value_type("y", TypeInfo::new(DType::F32, [2, 3]));
    let mut gemm = Node::new("dense", "Gemm")
        .with_inputs(["x", "W", "b"])
        .with_outputs(["g"]);
    if let Some(provider) = gemm_provider {
        gemm = gemm.with_provider(provider);
    }
    graph.add_node(gemm)?;
    graph.add_node(
        Node::new("clip", "Clip")
            .with_inputs(["g"])
            .with_outputs(["y"])
            .with_attribute("min", -5.0f32)
            .with_attribute("max", 10.0f32),
    )?;
    graph.add_output("y");
    Ok(graph)
}

fn input() -> Result<Tensor> {
    Ok(Tensor::from_vec(
        [2, 4],
        vec![1.0f32, 2.0, 3.0, 4.0, -1.0, -2.0, -3.0, -4.0],
    )?)
}

const EXPECTED: [f32; 6] = [10.0, 10.0, 10.0, -5.0, -5.0, -5.0];

fn session_with(providers: Vec<ProviderPtr>, graph: Graph) -> Result<InferenceSession> {
    let mut session = InferenceSession::new(SessionOptions::default());
    for provider in providers {
        session.register_provider(provider)?;
    }
    session.load(graph)?;
    session.initialize()?;
    Ok(session)
}

fn copy_ops(session: &InferenceSession) -> Vec<(String, String)> {
    let graph = session.graph().expect("loaded graph");
    let mut ops: Vec<(String, String)> = graph
        .nodes()
        .filter(|node| is_memcpy_op(node.op_type()))
        .map(|node| {
            (
                node.op_type().to_string(),
                node.provider().unwrap_or_default().to_string(),
            )
        })
        .collect();
    ops.sort();
    ops
}

#[test]
fn sim_only_uploads_feeds_and_initializers() -> Result<()> {
    let sim = Arc::new(SimExecutionProvider::new()?);
    let session = session_with(vec![sim.clone() as ProviderPtr], dense_clip_graph(None)?)?;

    let uploads = (MEMCPY_FROM_HOST.to_string(), SIM_PROVIDER.to_string());
    assert_eq!(copy_ops(&session), vec![uploads.clone(), uploads.clone(), uploads]);

    let y = session.run([("x", input()?)], &["y"])?;
    assert_eq!(y[0].to_vec::<f32>()?, EXPECTED);

    let stats = sim.stats();
    assert_eq!(stats.copies, 4, "three uploads and one fetch: {stats:?}");
    assert_eq!(stats.runs_started, 1);
    assert_eq!(stats.runs_ended, 1);
    assert!(stats.syncs >= 1);
    Ok(())
}

#[test]
fn pinned_gemm_on_sim_hands_off_to_cpu() -> Result<()> {
    let sim = Arc::new(SimExecutionProvider::new()?);
    let cpu: ProviderPtr = Arc::new(CpuExecutionProvider::new()?);
    let session = session_with(
        vec![cpu, sim.clone() as ProviderPtr],
        dense_clip_graph(Some(SIM_PROVIDER))?,
    )?;

    let graph = session.graph().expect("loaded graph");
    let placed: Vec<(&str, Option<&str>)> = graph
        .nodes()
        .filter(|node| node.op_type() == "Gemm" || node.op_type() == "Clip")
        .map(|node| (node.op_type(), node.provider()))
        .collect();
    assert!(placed.contains(&("Gemm", Some(SIM_PROVIDER))));
    assert!(placed.contains(&("Clip", Some(CPU_PROVIDER))));

    let mut expected_copies = vec![
        (MEMCPY_FROM_HOST.to_string(), SIM_PROVIDER.to_string()),
        (MEMCPY_FROM_HOST.to_string(), SIM_PROVIDER.to_string()),
        (MEMCPY_FROM_HOST.to_string(), SIM_PROVIDER.to_string()),
        (MEMCPY_TO_HOST.to_string(), SIM_PROVIDER.to_string()),
    ];
    expected_copies.sort();
    assert_eq!(copy_ops(&session), expected_copies);

    for run in 1..=3 {
        let y = session.run([("x", input()?)], &["y"])?;
        assert_eq!(y[0].to_vec::<f32>()?, EXPECTED);
        assert_eq!(sim.stats().copies, 4 * run);
    }
    Ok(())
}

/// `y = Relu(Gemm(x, W, b))` with each node pinned to its own provider.
fn dense_relu_graph(gemm_provider: &str, relu_provider: &str) -> Result<Graph> {
    let mut graph = Graph::new("dense_relu");
    graph.add_input("x", TypeInfo::new(DType::F32, [2, 4]));
    graph.add_initializer("W", Tensor::from_vec([4, 3], vec![1.0f32; 12])?);
    graph.add_initializer("b", Tensor::from_vec([3], vec![1.0f32; 3])?);
    graph.set_value_type("g", TypeInfo::new(DType::F32, [2, 3]));
    graph.set_value_type("y", TypeInfo::new(DType::F32, [2, 3]));
    graph.add_node(
        Node::new("dense", "Gemm")
            .with_inputs(["x", "W", "b"])
            .with_outputs(["g"])
            .with_provider(gemm_provider),
    )?;
    graph.add_node(
        Node::new("relu", "Relu")
            .with_inputs(["g"])
            .with_outputs(["y"])
            .with_provider(relu_provider),
    )?;
    graph.add_output("y");
    Ok(graph)
}

#[test]
fn cpu_producer_feeds_sim_consumer_through_one_copy() -> Result<()> {
    let cpu: ProviderPtr = Arc::new(CpuExecutionProvider::new()?);
    let reference = session_with(
        vec![cpu.clone()],
        dense_relu_graph(CPU_PROVIDER, CPU_PROVIDER)?,
    )?;
    let expected = reference.run([("x", input()?)], &["y"])?[0].to_vec::<f32>()?;
    assert_eq!(expected, vec![11.0, 11.0, 11.0, 0.0, 0.0, 0.0]);

    let sim = Arc::new(SimExecutionProvider::new()?);
    let session = session_with(
        vec![cpu, sim.clone() as ProviderPtr],
        dense_relu_graph(CPU_PROVIDER, SIM_PROVIDER)?,
    )?;

    let graph = session.graph().expect("loaded graph");
    let copies: Vec<(&str, Option<&str>, &[String])> = graph
        .nodes()
        .filter(|node| is_memcpy_op(node.op_type()))
        .map(|node| (node.op_type(), node.provider(), node.inputs()))
        .collect();
    assert_eq!(
        copies,
        vec![(MEMCPY_FROM_HOST, Some(SIM_PROVIDER), &["g".to_string()][..])]
    );

    let y = session.run([("x", input()?)], &["y"])?;
    assert_eq!(y[0].to_vec::<f32>()?, expected);
    Ok(())
}

#[test]
fn cpu_first_keeps_everything_on_the_host() -> Result<()> {
    let sim = Arc::new(SimExecutionProvider::new()?);
    let cpu: ProviderPtr = Arc::new(CpuExecutionProvider::new()?);
    let session = session_with(vec![cpu, sim.clone() as ProviderPtr], dense_clip_graph(None)?)?;

    assert!(copy_ops(&session).is_empty());
    let y = session.run([("x", input()?)], &["y"])?;
    assert_eq!(y[0].to_vec::<f32>()?, EXPECTED);
    assert_eq!(sim.stats().copies, 0);
    Ok(())
}

#[test]
fn outputs_stay_on_device_until_fetched() -> Result<()> {
    let sim = Arc::new(SimExecutionProvider::new()?);
    let session = session_with(vec![sim.clone() as ProviderPtr], dense_clip_graph(None)?)?;

    let frame = session.run_with_frame([("x", input()?)])?;
    let on_device = frame.fetch("y")?;
    let location = on_device.location().expect("allocated output");
    assert_eq!(location.device, Device::Accelerator(0));

    let before = sim.stats();
    let y = session.fetch_to_host(&frame, "y")?;
    assert_eq!(y.to_vec::<f32>()?, EXPECTED);
    assert!(y.location().expect("host tensor").device.is_host());
    assert_eq!(sim.stats().copies, before.copies + 1);
    assert_eq!(sim.stats().syncs, before.syncs + 1);
    Ok(())
}

#[test]
fn queues_defer_completion_until_sync() -> Result<()> {
    let sim = SimExecutionProvider::with_queues(0, 3)?;
    assert_eq!(sim.queue_count(), 3);

    let src = Tensor::from_vec([4], vec![1.0f32, 2.0, 3.0, 4.0])?;
    let allocator = sim.allocator(MemKind::Default).expect("device arena");
    let mut dst = Tensor::allocate(DType::F32, [4].into(), &allocator)?;
    sim.copy_tensor_on_queue(&src, &mut dst, 2)?;
    sim.copy_tensor_on_queue(&src, &mut dst, 0)?;
    assert_eq!(sim.pending_copies(), 2);

    let err = sim.copy_tensor_on_queue(&src, &mut dst, 3).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::InvalidQueue {
            queue_id: 3,
            queue_count: 3,
            ..
        }
    ));
    assert_eq!(sim.pending_copies(), 2);

    sim.sync()?;
    assert_eq!(
        sim.stats(),
        SimStats {
            copies: 2,
            pending: 0,
            syncs: 1,
            runs_started: 0,
            runs_ended: 0,
        }
    );
    assert_eq!(dst.to_vec::<f32>()?, src.to_vec::<f32>()?);
    Ok(())
}

#[test]
fn rejects_a_queueless_device() {
    let err = SimExecutionProvider::with_queues(0, 0).unwrap_err();
    assert!(matches!(err, RuntimeError::Usage(_)), "{err}");
}

#[test]
fn memory_kinds_map_to_device_and_staging() -> Result<()> {
    let sim = SimExecutionProvider::with_queues(2, 1)?;
    let device = sim.allocator(MemKind::Default).expect("device arena");
    assert_eq!(device.info().device, Device::Accelerator(2));
    let pinned = sim.allocator(MemKind::HostOutput).expect("pinned arena");
    assert!(pinned.info().device.is_host());
    let staging = sim.allocator(MemKind::HostInput).expect("host input");
    assert!(staging.info().device.is_host());

    let handle = sim
        .execution_handle()
        .and_then(|handle| handle.downcast_ref::<SimDevice>());
    assert_eq!(handle, Some(&SimDevice { ordinal: 2 }));
    Ok(())
}
