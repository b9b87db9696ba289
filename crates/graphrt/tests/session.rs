mod common;

use std::sync::Arc;

use graphrt::error::{ErrorCategory, RuntimeError};
use graphrt::graph::{Graph, Node};
use graphrt::kernel::{OpSchema, MEMCPY_FROM_HOST, MEMCPY_TO_HOST};
use graphrt::provider::ProviderPtr;
use graphrt::session::{InferenceSession, OptimizationLevel, SessionOptions};
use graphrt::transform::PipelineState;

use common::{
    f32_info, initialized_session, push_node, scale_add_graph, vector, TestProvider, DEVICE, HOST,
};

fn ops(session: &InferenceSession) -> Vec<String> {
    session
        .graph()
        .unwrap()
        .nodes()
        .map(|node| node.op_type().to_string())
        .collect()
}

#[test]
fn configuration_and_runs_must_follow_initialization_order() {
    let mut session = InferenceSession::new(SessionOptions::default());
    let err = session
        .run([("x", vector(&[1.0; 4]))], &["y"])
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Usage);

    assert!(session.initialize().is_err(), "no providers yet");
    session.register_provider(TestProvider::host()).unwrap();
    let err = session.initialize().unwrap_err();
    assert!(err.to_string().contains("no graph"), "{err}");

    let err = session.register_provider(TestProvider::host()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Usage);

    session.load(scale_add_graph()).unwrap();
    session.initialize().unwrap();
    assert!(session.is_initialized());

    assert!(session.initialize().is_err());
    assert!(session.load(scale_add_graph()).is_err());
    assert!(session.register_provider(TestProvider::device()).is_err());
    assert!(session.register_schema(OpSchema::new("Scale", 1, 1)).is_err());
}

#[test]
fn scale_add_runs_on_host() {
    let session = initialized_session(
        SessionOptions::default(),
        vec![TestProvider::host()],
        scale_add_graph(),
    );
    let outputs = session
        .run([("x", vector(&[1.0, 2.0, 3.0, 4.0]))], &["y"])
        .unwrap();
    assert_eq!(outputs[0].to_vec::<f32>().unwrap(), vec![3.0, 6.0, 9.0, 12.0]);
    assert!(outputs[0].location().unwrap().device.is_host());
}

#[test]
fn options_parse_from_json_with_defaults() {
    let options = SessionOptions::from_json_str(
        r#"{ "optimization_level": "disabled", "max_transform_sweeps": 0 }"#,
    )
    .unwrap();
    assert_eq!(options.optimization_level, OptimizationLevel::Disabled);
    assert_eq!(options.max_transform_sweeps, 1);
    assert!(options.release_intermediates_early);
    assert!(!options.dump_ir);

    assert_eq!(SessionOptions::from_json_str("{}").unwrap(), SessionOptions::default());
    let err = SessionOptions::from_json_str("{ \"max_transform_sweeps\": \"many\" }").unwrap_err();
    assert!(matches!(err, RuntimeError::Config(_)));
    assert_eq!(err.category(), ErrorCategory::Usage);

    assert_eq!("NONE".parse::<OptimizationLevel>().unwrap(), OptimizationLevel::Disabled);
    assert!("aggressive".parse::<OptimizationLevel>().is_err());
}

/// x -> Identity -> i -> Slice(full) -> s -> Scale(3) -> y
fn redundant_graph() -> Graph {
    let mut graph = Graph::new("redundant");
    graph.add_input("x", f32_info(&[3]));
    push_node(
        &mut graph,
        Node::new("id", "Identity").with_inputs(["x"]).with_outputs(["i"]),
        &[3],
    );
    push_node(
        &mut graph,
        Node::new("slice", "Slice")
            .with_inputs(["i"])
            .with_outputs(["s"])
            .with_attribute("starts", vec![0i64])
            .with_attribute("ends", vec![i64::MAX]),
        &[3],
    );
    push_node(
        &mut graph,
        Node::new("scale", "Scale")
            .with_inputs(["s"])
            .with_outputs(["y"])
            .with_attribute("factor", 3.0f32),
        &[3],
    );
    graph.add_output("y");
    graph
}

#[test]
fn basic_optimization_drops_redundant_nodes() {
    let session = initialized_session(
        SessionOptions::default(),
        vec![TestProvider::host()],
        redundant_graph(),
    );
    assert_eq!(ops(&session), vec!["Scale"]);
    let report = session.optimization_report().unwrap();
    assert_eq!(report.state, PipelineState::Stable);
    assert_eq!(report.result.nodes_removed, 2);

    let outputs = session.run([("x", vector(&[1.0, 2.0, 3.0]))], &["y"]).unwrap();
    assert_eq!(outputs[0].to_vec::<f32>().unwrap(), vec![3.0, 6.0, 9.0]);
}

#[test]
fn disabled_optimization_keeps_every_node() {
    let options = SessionOptions {
        optimization_level: OptimizationLevel::Disabled,
        ..SessionOptions::default()
    };
    let session = initialized_session(options, vec![TestProvider::host()], redundant_graph());
    assert_eq!(session.graph().unwrap().node_count(), 3);
    assert!(session.optimization_report().is_none());

    let outputs = session.run([("x", vector(&[1.0, 2.0, 3.0]))], &["y"]).unwrap();
    assert_eq!(outputs[0].to_vec::<f32>().unwrap(), vec![3.0, 6.0, 9.0]);
}

#[test]
fn unsupported_op_fails_initialization_and_keeps_session_uninitialized() {
    let mut graph = scale_add_graph();
    graph.set_value_type("z", f32_info(&[4]));
    graph
        .add_node(Node::new("mystery", "Mystery").with_inputs(["y"]).with_outputs(["z"]))
        .unwrap();

    let mut session = InferenceSession::new(SessionOptions::default());
    session.register_provider(TestProvider::host()).unwrap();
    session.load(graph).unwrap();
    let err = session.initialize().unwrap_err();
    assert!(matches!(err, RuntimeError::KernelNotFound { ref node, .. } if node == "mystery"), "{err}");
    assert_eq!(err.category(), ErrorCategory::KernelResolution);
    assert!(err.category().aborts_session_build());
    assert!(!session.is_initialized());
    assert_eq!(session.graph().unwrap().node_count(), 3);
}

#[test]
fn cyclic_graph_is_rejected_at_initialization() {
    let mut graph = Graph::new("loop");
    graph.add_input("x", f32_info(&[2]));
    push_node(
        &mut graph,
        Node::new("a", "Add").with_inputs(["x", "q"]).with_outputs(["p"]),
        &[2],
    );
    push_node(
        &mut graph,
        Node::new("b", "Scale").with_inputs(["p"]).with_outputs(["q"]),
        &[2],
    );
    graph.add_output("p");

    let mut session = InferenceSession::new(SessionOptions::default());
    session.register_provider(TestProvider::host()).unwrap();
    session.load(graph).unwrap();
    let err = session.initialize().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidGraph);
}

#[test]
fn registered_schema_tightens_arity_checks() {
    let mut graph = Graph::new("arity");
    graph.add_input("x", f32_info(&[2]));
    push_node(
        &mut graph,
        Node::new("s", "Scale").with_inputs(["x", "x"]).with_outputs(["y"]),
        &[2],
    );
    graph.add_output("y");

    let mut session = InferenceSession::new(SessionOptions::default());
    session.register_provider(TestProvider::host()).unwrap();
    session.register_schema(OpSchema::new("Scale", 1, 1)).unwrap();
    session.load(graph).unwrap();
    let err = session.initialize().unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidGraph(_)), "{err}");
}

#[test]
fn earlier_providers_win_placement() {
    let host = TestProvider::host();
    let device = TestProvider::device();
    let providers: Vec<ProviderPtr> = vec![host, device.clone()];
    let session = initialized_session(SessionOptions::default(), providers, scale_add_graph());

    for node in session.graph().unwrap().nodes() {
        assert_eq!(node.provider(), Some(HOST));
    }
    assert_eq!(session.memcpy_report().unwrap().result.nodes_inserted, 0);
    session.run([("x", vector(&[1.0; 4]))], &["y"]).unwrap();
    assert_eq!(device.copy_count(), 0);
}

#[test]
fn split_placement_copies_across_the_boundary() {
    let mut graph = Graph::new("split");
    graph.add_input("x", f32_info(&[4]));
    push_node(
        &mut graph,
        Node::new("scale", "Scale")
            .with_inputs(["x"])
            .with_outputs(["a"])
            .with_attribute("factor", 2.0f32)
            .with_provider(DEVICE),
        &[4],
    );
    push_node(
        &mut graph,
        Node::new("add", "Add").with_inputs(["a", "x"]).with_outputs(["y"]),
        &[4],
    );
    graph.add_output("y");

    let device = TestProvider::device();
    let providers: Vec<ProviderPtr> = vec![TestProvider::host(), device.clone()];
    let session = initialized_session(SessionOptions::default(), providers, graph);

    let mut kinds = ops(&session);
    kinds.sort();
    assert_eq!(kinds, vec!["Add", MEMCPY_FROM_HOST, MEMCPY_TO_HOST, "Scale"]);
    assert_eq!(session.memcpy_report().unwrap().state, PipelineState::Stable);

    let outputs = session
        .run([("x", vector(&[1.0, 2.0, 3.0, 4.0]))], &["y"])
        .unwrap();
    assert_eq!(outputs[0].to_vec::<f32>().unwrap(), vec![3.0, 6.0, 9.0, 12.0]);
    assert_eq!(device.copy_count(), 2);
}

#[test]
fn device_outputs_are_copied_back_on_fetch() {
    let device = TestProvider::device();
    let session = initialized_session(
        SessionOptions::default(),
        vec![device.clone() as ProviderPtr],
        scale_add_graph(),
    );
    assert_eq!(session.memcpy_report().unwrap().result.nodes_inserted, 1);

    let frame = session
        .run_with_frame([("x", vector(&[1.0, 1.0, 2.0, 2.0]))])
        .unwrap();
    let raw = frame.fetch("y").unwrap();
    assert!(!raw.location().unwrap().device.is_host());
    let host = session.fetch_to_host(&frame, "y").unwrap();
    assert!(host.location().unwrap().device.is_host());
    assert_eq!(host.to_vec::<f32>().unwrap(), vec![3.0, 3.0, 6.0, 6.0]);
    assert_eq!(device.copy_count(), 2);
}

#[test]
fn only_graph_outputs_can_be_fetched() {
    let session = initialized_session(
        SessionOptions::default(),
        vec![TestProvider::host()],
        scale_add_graph(),
    );
    let err = session.run([("x", vector(&[1.0; 4]))], &["a"]).unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownOutput(ref name) if name == "a"), "{err}");
}

#[test]
fn initializers_feed_kernels_and_survive_runs() {
    let mut graph = Graph::new("bias");
    graph.add_input("x", f32_info(&[2]));
    graph.add_initializer("bias", vector(&[10.0, 20.0]));
    push_node(
        &mut graph,
        Node::new("add", "Add").with_inputs(["x", "bias"]).with_outputs(["y"]),
        &[2],
    );
    graph.add_output("y");
    let session = initialized_session(SessionOptions::default(), vec![TestProvider::host()], graph);

    for step in 0..3 {
        let x = step as f32;
        let outputs = session.run([("x", vector(&[x, x]))], &["y"]).unwrap();
        assert_eq!(outputs[0].to_vec::<f32>().unwrap(), vec![10.0 + x, 20.0 + x]);
    }
}

#[test]
fn concurrent_runs_use_independent_frames() {
    let device = TestProvider::device();
    let session = Arc::new(initialized_session(
        SessionOptions::default(),
        vec![device.clone() as ProviderPtr],
        scale_add_graph(),
    ));

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let session = Arc::clone(&session);
            scope.spawn(move || {
                for round in 0..25 {
                    let base = (worker * 100 + round) as f32;
                    let input = [base, base + 1.0, base + 2.0, base + 3.0];
                    let outputs = session.run([("x", vector(&input))], &["y"]).unwrap();
                    let expected: Vec<f32> = input.iter().map(|v| v * 3.0).collect();
                    assert_eq!(outputs[0].to_vec::<f32>().unwrap(), expected);
                }
            });
        }
    });
    // One upload node plus one fetch copy per run.
    assert_eq!(device.copy_count(), 8 * 25 * 2);
}
