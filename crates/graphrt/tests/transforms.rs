mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use graphrt::error::{Result, RuntimeError};
use graphrt::graph::{Graph, Node, NodeId};
use graphrt::kernel::{KernelRegistryManager, SchemaRegistry, MEMCPY_FROM_HOST, MEMCPY_TO_HOST};
use graphrt::provider::ExecutionProviders;
use graphrt::transform::{
    EliminateIdentity, EliminateSlice, GraphTransformer, MemcpyTransformer, PipelineBuilder,
    PipelineState, RuleBasedTransformer, TransformResult, TransformerPipeline,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use common::{f32_info, push_node, TestProvider, DEVICE, DEVICE_B, HOST};

fn schemas() -> &'static SchemaRegistry {
    SchemaRegistry::builtin()
}

/// x -> Slice -> s -> Scale -> y
fn slice_graph(starts: Vec<i64>, ends: Vec<i64>) -> (Graph, NodeId, NodeId) {
    let mut graph = Graph::new("slice");
    graph.add_input("x", f32_info(&[4, 4]));
    let slice = push_node(
        &mut graph,
        Node::new("slice", "Slice")
            .with_inputs(["x"])
            .with_outputs(["s"])
            .with_attribute("starts", starts)
            .with_attribute("ends", ends),
        &[4, 4],
    );
    let consumer = push_node(
        &mut graph,
        Node::new("scale", "Scale").with_inputs(["s"]).with_outputs(["y"]),
        &[4, 4],
    );
    graph.add_output("y");
    graph.resolve(schemas()).unwrap();
    (graph, slice, consumer)
}

fn eliminate_slice(graph: &mut Graph) -> TransformResult {
    RuleBasedTransformer::new("SliceElimination")
        .with_rule(EliminateSlice)
        .apply(graph)
        .unwrap()
}

#[test]
fn full_range_slice_is_removed_and_consumer_rewired() {
    for ends in [vec![-1, -1], vec![i64::MAX, -1], vec![i64::MAX, i64::MAX]] {
        let (mut graph, slice, consumer) = slice_graph(vec![0, 0], ends.clone());
        let result = eliminate_slice(&mut graph);
        assert!(result.modified, "ends {ends:?}");
        assert_eq!(result.nodes_removed, 1);
        assert!(graph.node(slice).is_none());
        assert_eq!(graph.node(consumer).unwrap().inputs(), &["x"]);
        graph.resolve(schemas()).unwrap();
    }
}

#[test]
fn effective_slices_are_kept() {
    let cases = [
        (vec![1, 0], vec![-1, -1]),
        (vec![0, 0], vec![2, -1]),
        (vec![0, 0], vec![-1, i64::MAX - 1]),
        (vec![0, -1], vec![-1, -1]),
        (vec![0], vec![-1, -1]),
    ];
    for (starts, ends) in cases {
        let (mut graph, slice, consumer) = slice_graph(starts.clone(), ends.clone());
        let result = eliminate_slice(&mut graph);
        assert!(!result.modified, "starts {starts:?} ends {ends:?}");
        assert!(graph.node(slice).is_some());
        assert_eq!(graph.node(consumer).unwrap().inputs(), &["s"]);
    }
}

#[test]
fn slice_feeding_a_graph_output_is_kept() {
    let mut graph = Graph::new("observable");
    graph.add_input("x", f32_info(&[4]));
    let slice = push_node(
        &mut graph,
        Node::new("slice", "Slice")
            .with_inputs(["x"])
            .with_outputs(["y"])
            .with_attribute("starts", vec![0i64])
            .with_attribute("ends", vec![-1i64]),
        &[4],
    );
    graph.add_output("y");
    graph.resolve(schemas()).unwrap();
    assert!(!eliminate_slice(&mut graph).modified);
    assert!(graph.node(slice).is_some());
}

#[test]
fn random_slice_attributes_follow_the_no_op_rule() {
    let starts_pool = [0i64, 0, 0, 1, 3, -2];
    let ends_pool = [-1i64, -1, i64::MAX, i64::MAX, 0, 1, 4, 1000, i64::MAX - 1];
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let axes = rng.gen_range(1..4);
        let starts: Vec<i64> = (0..axes).map(|_| *starts_pool.choose(&mut rng).unwrap()).collect();
        let ends: Vec<i64> = (0..axes).map(|_| *ends_pool.choose(&mut rng).unwrap()).collect();
        let expect_removed = starts.iter().all(|s| *s == 0)
            && ends.iter().all(|e| *e == -1 || *e == i64::MAX);

        let (mut graph, slice, _) = slice_graph(starts.clone(), ends.clone());
        eliminate_slice(&mut graph);
        assert_eq!(
            graph.node(slice).is_none(),
            expect_removed,
            "starts {starts:?} ends {ends:?}"
        );
        graph.resolve(schemas()).unwrap();
    }
}

#[test]
fn identity_chain_collapses_in_one_sweep() {
    let mut graph = Graph::new("identities");
    graph.add_input("x", f32_info(&[2]));
    push_node(
        &mut graph,
        Node::new("i0", "Identity").with_inputs(["x"]).with_outputs(["a"]),
        &[2],
    );
    push_node(
        &mut graph,
        Node::new("i1", "Identity").with_inputs(["a"]).with_outputs(["b"]),
        &[2],
    );
    let scale = push_node(
        &mut graph,
        Node::new("scale", "Scale").with_inputs(["b"]).with_outputs(["y"]),
        &[2],
    );
    graph.add_output("y");

    let redundant = RuleBasedTransformer::new("Redundant")
        .with_rule(EliminateIdentity)
        .with_rule(EliminateSlice);
    assert_eq!(
        redundant.rule_names().collect::<Vec<_>>(),
        ["EliminateIdentity", "EliminateSlice"]
    );
    let mut builder = PipelineBuilder::new();
    builder.pass(Arc::new(redundant));
    let report = TransformerPipeline::new(builder.finish(), 5)
        .run(&mut graph, schemas())
        .unwrap();
    assert_eq!(report.state, PipelineState::Stable);
    assert_eq!(report.sweeps, 2);
    assert_eq!(report.result.nodes_removed, 2);
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.node(scale).unwrap().inputs(), &["x"]);
}

/// Claims a modification on every call without changing anything.
struct Restless {
    calls: AtomicUsize,
}

impl GraphTransformer for Restless {
    fn name(&self) -> &'static str {
        "Restless"
    }

    fn apply(&self, _graph: &mut Graph) -> Result<TransformResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TransformResult {
            modified: true,
            ..TransformResult::default()
        })
    }
}

#[test]
fn non_converging_pass_stops_at_sweep_bound() {
    let restless = Arc::new(Restless {
        calls: AtomicUsize::new(0),
    });
    let mut builder = PipelineBuilder::new();
    let inner = Arc::clone(&restless);
    builder.fixed_point(4, move |p| p.pass(inner));
    let mut graph = common::scale_add_graph();

    let report = TransformerPipeline::new(builder.finish(), 3)
        .run(&mut graph, schemas())
        .unwrap();
    assert_eq!(report.state, PipelineState::SweepBoundReached);
    assert_eq!(report.sweeps, 3);
    assert_eq!(restless.calls.load(Ordering::SeqCst), 12);
}

/// Adds a node that reads a value nobody produces.
struct Vandal;

impl GraphTransformer for Vandal {
    fn name(&self) -> &'static str {
        "Vandal"
    }

    fn apply(&self, graph: &mut Graph) -> Result<TransformResult> {
        graph.set_value_type("junk", f32_info(&[4]));
        graph.add_node(
            Node::new("bad", "Scale")
                .with_inputs(["nowhere"])
                .with_outputs(["junk"]),
        )?;
        Ok(TransformResult {
            modified: true,
            nodes_inserted: 1,
            ..TransformResult::default()
        })
    }
}

#[test]
fn invalid_rewrite_surfaces_as_ir_error() {
    let mut builder = PipelineBuilder::new();
    builder.pass(Arc::new(Vandal));
    let mut graph = common::scale_add_graph();
    let err = TransformerPipeline::new(builder.finish(), 2)
        .run(&mut graph, schemas())
        .unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidGraph(_)), "{err}");
    assert!(err.to_string().contains("Vandal"), "{err}");
}

fn providers(list: Vec<Arc<TestProvider>>) -> ExecutionProviders {
    let mut providers = ExecutionProviders::new();
    for provider in list {
        providers.add(provider).unwrap();
    }
    providers
}

fn insert_copies(graph: &mut Graph, providers: &ExecutionProviders) -> TransformResult {
    graph.resolve(schemas()).unwrap();
    let transformer = MemcpyTransformer::new(
        providers.clone(),
        KernelRegistryManager::from_providers(providers),
    );
    let result = transformer.apply(graph).unwrap();
    graph.resolve(schemas()).unwrap();
    result
}

fn count_op(graph: &Graph, op: &str) -> usize {
    graph.nodes().filter(|node| node.op_type() == op).count()
}

fn scale(name: &str, input: &str, output: &str, provider: &str) -> Node {
    Node::new(name, "Scale")
        .with_inputs([input])
        .with_outputs([output])
        .with_provider(provider)
}

#[test]
fn fan_out_shares_one_copy_per_destination() {
    let providers = providers(vec![TestProvider::host(), TestProvider::device()]);
    let mut graph = Graph::new("fan_out");
    graph.add_input("x", f32_info(&[4]));
    push_node(&mut graph, scale("p", "x", "h", HOST), &[4]);
    let c1 = push_node(&mut graph, scale("c1", "h", "d1", DEVICE), &[4]);
    let c2 = push_node(&mut graph, scale("c2", "h", "d2", DEVICE), &[4]);
    let c3 = push_node(&mut graph, scale("c3", "h", "d3", DEVICE), &[4]);
    let back = push_node(&mut graph, scale("back", "d1", "y", HOST), &[4]);
    graph.add_output("y");
    graph.add_output("d2");
    graph.add_output("d3");

    let result = insert_copies(&mut graph, &providers);
    assert_eq!(result.nodes_inserted, 2);
    assert_eq!(count_op(&graph, MEMCPY_FROM_HOST), 1);
    assert_eq!(count_op(&graph, MEMCPY_TO_HOST), 1);

    let copied = graph.node(c1).unwrap().inputs()[0].clone();
    assert_ne!(copied, "h");
    assert_eq!(graph.node(c2).unwrap().inputs()[0], copied);
    assert_eq!(graph.node(c3).unwrap().inputs()[0], copied);
    let copy_node = graph.require_node(graph.producer(&copied).unwrap()).unwrap();
    assert_eq!(copy_node.op_type(), MEMCPY_FROM_HOST);
    assert_eq!(copy_node.provider(), Some(DEVICE));
    assert_eq!(graph.value_type(&copied), graph.value_type("h"));

    let staged = graph.node(back).unwrap().inputs()[0].clone();
    let to_host = graph.require_node(graph.producer(&staged).unwrap()).unwrap();
    assert_eq!(to_host.op_type(), MEMCPY_TO_HOST);
    assert_eq!(to_host.provider(), Some(DEVICE));
}

#[test]
fn copy_insertion_is_idempotent() {
    let providers = providers(vec![TestProvider::host(), TestProvider::device()]);
    let mut graph = Graph::new("twice");
    graph.add_input("x", f32_info(&[4]));
    push_node(&mut graph, scale("a", "x", "h", HOST), &[4]);
    push_node(&mut graph, scale("b", "h", "d", DEVICE), &[4]);
    push_node(&mut graph, scale("c", "d", "y", HOST), &[4]);
    graph.add_output("y");

    assert_eq!(insert_copies(&mut graph, &providers).nodes_inserted, 2);
    let second = insert_copies(&mut graph, &providers);
    assert!(!second.modified);
    assert_eq!(graph.node_count(), 5);
}

#[test]
fn graph_input_consumed_on_device_gets_one_upload() {
    let providers = providers(vec![TestProvider::device()]);
    let mut graph = Graph::new("upload");
    graph.add_input("x", f32_info(&[4]));
    push_node(&mut graph, scale("a", "x", "y", DEVICE), &[4]);
    push_node(&mut graph, scale("b", "x", "z", DEVICE), &[4]);
    graph.add_output("y");
    graph.add_output("z");

    let result = insert_copies(&mut graph, &providers);
    assert_eq!(result.nodes_inserted, 1);
    assert_eq!(count_op(&graph, MEMCPY_FROM_HOST), 1);
}

#[test]
fn device_to_device_edges_stage_through_host() {
    let providers = providers(vec![
        TestProvider::device(),
        TestProvider::device_named(DEVICE_B, 8),
    ]);
    let mut graph = Graph::new("d2d");
    graph.add_input("x", f32_info(&[4]));
    push_node(&mut graph, scale("a", "x", "h", DEVICE), &[4]);
    let b = push_node(&mut graph, scale("b", "h", "y", DEVICE_B), &[4]);
    graph.add_output("y");

    let result = insert_copies(&mut graph, &providers);
    assert_eq!(result.nodes_inserted, 3);
    assert_eq!(count_op(&graph, MEMCPY_TO_HOST), 1);
    assert_eq!(count_op(&graph, MEMCPY_FROM_HOST), 2);

    let uploaded = &graph.node(b).unwrap().inputs()[0];
    let upload = graph.require_node(graph.producer(uploaded).unwrap()).unwrap();
    assert_eq!(upload.op_type(), MEMCPY_FROM_HOST);
    assert_eq!(upload.provider(), Some(DEVICE_B));
    let download = graph.require_node(graph.producer(&upload.inputs()[0]).unwrap()).unwrap();
    assert_eq!(download.op_type(), MEMCPY_TO_HOST);
    assert_eq!(download.provider(), Some(DEVICE));
}

#[test]
fn single_provider_needs_no_copies() {
    let providers = providers(vec![TestProvider::host()]);
    let mut graph = common::scale_add_graph();
    graph.resolve(schemas()).unwrap();
    let order = graph.topological_order().unwrap().to_vec();
    for id in order {
        graph.set_node_provider(id, HOST).unwrap();
    }
    let result = insert_copies(&mut graph, &providers);
    assert!(!result.modified);
}
