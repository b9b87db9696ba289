use std::sync::Arc;

use graphrt::alloc::MemKind;
use graphrt::error::RuntimeError;
use graphrt::graph::{Graph, Node, TypeInfo};
use graphrt::kernel::{MEMCPY_FROM_HOST, MEMCPY_TO_HOST};
use graphrt::session::{InferenceSession, SessionOptions};
use graphrt::tensor::{DType, Shape, Tensor};
use graphrt::ProviderPtr;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_host_tensor(seed: u64, dims: &[usize]) -> Tensor {
    let mut rng = StdRng::seed_from_u64(seed);
    let shape = Shape::new(dims);
    let values = (0..shape.num_elements())
        .map(|_| rng.gen_range(-4.0f32..4.0))
        .collect::<Vec<_>>();
    Tensor::from_vec(shape, values).expect("host tensor")
}

fn device_tensor(provider: &ProviderPtr, dtype: DType, dims: &[usize]) -> Tensor {
    let allocator = provider
        .allocator(MemKind::Default)
        .expect("provider has a default allocator");
    Tensor::allocate(dtype, Shape::new(dims), &allocator).expect("device allocation")
}

fn host_tensor(dtype: DType, dims: &[usize]) -> Tensor {
    Tensor::allocate(dtype, Shape::new(dims), &graphrt::alloc::host_allocator())
        .expect("host allocation")
}

pub fn default_allocator_is_registered(provider: &ProviderPtr) {
    assert!(!provider.provider_type().is_empty());
    assert!(!provider.allocators().is_empty());
    let allocator = provider
        .allocator(MemKind::Default)
        .expect("default allocator");
    assert_eq!(allocator.info().mem_kind, MemKind::Default);
}

pub fn copy_round_trips_through_device_memory(provider: &ProviderPtr) {
    let src = random_host_tensor(17, &[3, 5]);
    let mut on_device = device_tensor(provider, DType::F32, &[3, 5]);
    provider.copy_tensor(&src, &mut on_device).unwrap();

    let mut back = host_tensor(DType::F32, &[3, 5]);
    provider.sync().unwrap();
    provider.copy_tensor(&on_device, &mut back).unwrap();
    provider.sync().unwrap();
    assert_eq!(back.to_vec::<f32>().unwrap(), src.to_vec::<f32>().unwrap());
}

pub fn copy_rejects_mismatched_destination(provider: &ProviderPtr) {
    let src = random_host_tensor(3, &[4]);

    let mut wrong_shape = device_tensor(provider, DType::F32, &[2, 2]);
    let err = provider.copy_tensor(&src, &mut wrong_shape).unwrap_err();
    assert!(matches!(err, RuntimeError::ShapeMismatch(_)), "{err}");

    let mut wrong_dtype = device_tensor(provider, DType::I32, &[4]);
    let err = provider.copy_tensor(&src, &mut wrong_dtype).unwrap_err();
    assert!(matches!(err, RuntimeError::TypeMismatch(_)), "{err}");
}

pub fn queue_zero_is_always_valid(provider: &ProviderPtr) {
    assert!(provider.queue_count() >= 1);
    let src = random_host_tensor(5, &[8]);
    let mut dst = device_tensor(provider, DType::F32, &[8]);
    provider.copy_tensor_on_queue(&src, &mut dst, 0).unwrap();
    provider.sync().unwrap();

    let mut back = host_tensor(DType::F32, &[8]);
    provider.copy_tensor(&dst, &mut back).unwrap();
    assert_eq!(back.to_vec::<f32>().unwrap(), src.to_vec::<f32>().unwrap());
}

pub fn out_of_range_queue_is_rejected(provider: &ProviderPtr) {
    let src = random_host_tensor(9, &[2]);
    let mut dst = device_tensor(provider, DType::F32, &[2]);
    let queue = provider.queue_count();
    match provider.copy_tensor_on_queue(&src, &mut dst, queue) {
        Err(RuntimeError::InvalidQueue {
            queue_id,
            queue_count,
            ..
        }) => {
            assert_eq!(queue_id, queue);
            assert_eq!(queue_count, queue);
        }
        other => panic!("expected InvalidQueue, got {other:?}"),
    }
}

pub fn run_hooks_and_sync_succeed(provider: &ProviderPtr) {
    for _ in 0..2 {
        provider.on_run_start().unwrap();
        provider.sync().unwrap();
        provider.on_run_end().unwrap();
    }
}

pub fn kernel_registry_is_shared(first: &ProviderPtr, second: &ProviderPtr) {
    assert_eq!(first.provider_type(), second.provider_type());
    let registry = first.kernel_registry();
    assert!(Arc::ptr_eq(&registry, &second.kernel_registry()));
    assert!(!registry.is_empty());
    for def in registry.kernel_defs() {
        assert_eq!(def.provider_type(), first.provider_type(), "{def}");
    }
}

pub fn device_providers_register_memcpy_kernels(provider: &ProviderPtr) {
    let on_host = provider
        .allocator(MemKind::Default)
        .is_some_and(|allocator| allocator.info().device.is_host());
    if on_host {
        return;
    }
    let registry = provider.kernel_registry();
    for op in [MEMCPY_FROM_HOST, MEMCPY_TO_HOST] {
        assert!(
            registry.has_op(op, provider.provider_type()),
            "{} lacks {op}",
            provider.provider_type()
        );
    }
}

pub fn identity_graph_runs_end_to_end(provider: ProviderPtr) {
    let mut graph = Graph::new("identity");
    let info = TypeInfo::new(DType::F32, Shape::new([2, 3]));
    graph.add_input("x", info.clone());
    graph.set_value_type("y", info);
    graph
        .add_node(Node::new("identity", "Identity").with_inputs(["x"]).with_outputs(["y"]))
        .unwrap();
    graph.add_output("y");

    let options = SessionOptions {
        optimization_level: graphrt::session::OptimizationLevel::Disabled,
        ..SessionOptions::default()
    };
    let mut session = InferenceSession::new(options);
    session.register_provider(provider).unwrap();
    session.load(graph).unwrap();
    session.initialize().unwrap();

    let x = random_host_tensor(23, &[2, 3]);
    let expected = x.to_vec::<f32>().unwrap();
    let outputs = session.run([("x", x)], &["y"]).unwrap();
    assert_eq!(outputs[0].to_vec::<f32>().unwrap(), expected);
    assert!(outputs[0].location().unwrap().device.is_host());
}
