use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ragpipe_shared::{Document, RagPipeError, Result};

use super::*;

/// Test component: appends its name to every text it receives.
struct Probe {
    name: String,
    inputs: Vec<SocketSpec>,
    outputs: Vec<SocketSpec>,
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl Probe {
    fn new(name: &str, calls: &Arc<AtomicUsize>) -> Self {
        Self {
            name: name.to_string(),
            inputs: vec![SocketSpec::required("text", ValueKind::Text)],
            outputs: vec![SocketSpec::output("text", ValueKind::Text)],
            calls: Arc::clone(calls),
            fail: false,
        }
    }

    fn source(name: &str, calls: &Arc<AtomicUsize>) -> Self {
        Self {
            inputs: vec![SocketSpec::optional("text", ValueKind::Text)],
            ..Self::new(name, calls)
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn with_inputs(mut self, inputs: Vec<SocketSpec>) -> Self {
        self.inputs = inputs;
        self
    }

    fn with_outputs(mut self, outputs: Vec<SocketSpec>) -> Self {
        self.outputs = outputs;
        self
    }
}

impl Component for Probe {
    fn inputs(&self) -> Vec<SocketSpec> {
        self.inputs.clone()
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        self.outputs.clone()
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagPipeError::Provider(format!("{} exploded", self.name)));
        }
        let mut seen: Vec<String> = Vec::new();
        for spec in &self.inputs {
            for value in inputs.take_all(&spec.name) {
                if let Value::Text(text) = value {
                    seen.push(text);
                }
            }
        }
        let text = if seen.is_empty() {
            self.name.clone()
        } else {
            format!("{}>{}", seen.join("|"), self.name)
        };
        let mut out = SocketValues::new();
        for spec in &self.outputs {
            if spec.kind == ValueKind::Text {
                out.push(spec.name.clone(), Value::Text(text.clone()));
            }
        }
        Ok(out)
    }
}

fn text(result: &RunResult, component: &str, socket: &str) -> String {
    match result.get(component, socket) {
        Some(Value::Text(t)) => t.clone(),
        other => panic!("expected text at {component}.{socket}, got {other:?}"),
    }
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[test]
fn every_component_runs_exactly_once() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("a", Probe::source("a", &calls)).unwrap();
    pipe.add_component("b", Probe::new("b", &calls)).unwrap();
    pipe.add_component("c", Probe::new("c", &calls)).unwrap();
    pipe.add_component("d", Probe::new("d", &calls)).unwrap();
    pipe.connect("a", "b").unwrap();
    pipe.connect("b", "c").unwrap();
    pipe.connect("a", "d").unwrap();

    let result = pipe.run(PipelineInputs::new()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(text(&result, "c", "text"), "a>b>c");
    assert_eq!(text(&result, "d", "text"), "a>d");
    assert!(result.component("a").is_none());
}

#[test]
fn fan_out_delivers_the_same_value_to_each_target() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("src", Probe::source("src", &calls)).unwrap();
    pipe.add_component("left", Probe::new("left", &calls)).unwrap();
    pipe.add_component("right", Probe::new("right", &calls)).unwrap();
    pipe.connect("src.text", "left.text").unwrap();
    pipe.connect("src.text", "right.text").unwrap();

    let inputs = PipelineInputs::new().with("src", "text", Value::Text("q".into()));
    let result = pipe.run(inputs).unwrap();
    assert_eq!(text(&result, "left", "text"), "q>src>left");
    assert_eq!(text(&result, "right", "text"), "q>src>right");
    // Components fed at run time report every output, consumed or not.
    assert_eq!(text(&result, "src", "text"), "q>src");
}

#[test]
fn ties_break_by_insertion_order() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("z", Probe::source("z", &calls)).unwrap();
    pipe.add_component("y", Probe::source("y", &calls)).unwrap();
    pipe.add_component("x", Probe::new("x", &calls)).unwrap();
    pipe.connect("y", "x").unwrap();
    assert_eq!(pipe.execution_order().unwrap(), vec!["z", "y", "x"]);
    assert_eq!(pipe.component_names(), vec!["z", "y", "x"]);
}

#[test]
fn second_of_three_fails_and_third_never_runs() {
    let (first, second, third) = (counter(), counter(), counter());
    let mut pipe = Pipeline::new();
    pipe.add_component("first", Probe::source("first", &first)).unwrap();
    pipe.add_component("second", Probe::new("second", &second).failing()).unwrap();
    pipe.add_component("third", Probe::new("third", &third)).unwrap();
    pipe.connect("first", "second").unwrap();
    pipe.connect("second", "third").unwrap();

    let err = pipe.run(PipelineInputs::new()).unwrap_err();
    assert_eq!(err.failed_component(), Some("second"));
    assert!(matches!(
        err,
        GraphError::ComponentExecution { source: RagPipeError::Provider(_), .. }
    ));
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(third.load(Ordering::SeqCst), 0);
}

#[test]
fn cycle_is_rejected_before_anything_runs() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("entry", Probe::source("entry", &calls)).unwrap();
    let looped = || {
        vec![
            SocketSpec::optional("seed", ValueKind::Text),
            SocketSpec::optional("text", ValueKind::Text),
        ]
    };
    pipe.add_component("a", Probe::new("a", &calls).with_inputs(looped())).unwrap();
    pipe.add_component("b", Probe::new("b", &calls)).unwrap();
    pipe.connect("entry", "a.seed").unwrap();
    pipe.connect("a", "b").unwrap();
    pipe.connect("b", "a.text").unwrap();

    let err = pipe.run(PipelineInputs::new()).unwrap_err();
    match err {
        GraphError::UnresolvedGraph { components } => {
            assert_eq!(components, vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("expected UnresolvedGraph, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(pipe.execution_order().is_err());
}

#[test]
fn unfed_required_input_is_rejected_before_running() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("a", Probe::source("a", &calls)).unwrap();
    pipe.add_component("lonely", Probe::new("lonely", &calls)).unwrap();

    let err = pipe.run(PipelineInputs::new()).unwrap_err();
    assert!(matches!(
        &err,
        GraphError::UnresolvedGraph { components } if components == &vec!["lonely".to_string()]
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let inputs = PipelineInputs::new().with("lonely", "text", Value::Text("hi".into()));
    let result = pipe.run(inputs).unwrap();
    assert_eq!(text(&result, "lonely", "text"), "hi>lonely");
}

#[test]
fn missing_upstream_output_aborts_at_run_time() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    let two_outputs = vec![
        SocketSpec::output("text", ValueKind::Text),
        SocketSpec::output("extra", ValueKind::Count),
    ];
    pipe.add_component("a", Probe::source("a", &calls).with_outputs(two_outputs)).unwrap();
    let wants_count = vec![SocketSpec::required("n", ValueKind::Count)];
    pipe.add_component("b", Probe::new("b", &calls).with_inputs(wants_count)).unwrap();
    pipe.connect("a.extra", "b.n").unwrap();

    // Probe never emits the Count output, so `b` cannot be fed.
    let err = pipe.run(PipelineInputs::new()).unwrap_err();
    assert!(matches!(err, GraphError::UnresolvedGraph { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn optional_inputs_receive_defaults() {
    struct TopK;
    impl Component for TopK {
        fn inputs(&self) -> Vec<SocketSpec> {
            vec![SocketSpec::with_default("top_k", Value::Count(10))]
        }
        fn outputs(&self) -> Vec<SocketSpec> {
            vec![SocketSpec::output("top_k", ValueKind::Count)]
        }
        fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
            let k = inputs.take_optional_count("top_k")?.unwrap_or(0);
            Ok(SocketValues::new().with("top_k", Value::Count(k)))
        }
    }

    let mut pipe = Pipeline::new();
    pipe.add_component("k", TopK).unwrap();
    let result = pipe.run(PipelineInputs::new()).unwrap();
    assert_eq!(result.get("k", "top_k"), Some(&Value::Count(10)));

    let result = pipe
        .run(PipelineInputs::new().with("k", "top_k", Value::Count(3)))
        .unwrap();
    assert_eq!(result.get("k", "top_k"), Some(&Value::Count(3)));
}

#[test]
fn variadic_inputs_concatenate_in_edge_order() {
    struct Join;
    impl Component for Join {
        fn inputs(&self) -> Vec<SocketSpec> {
            vec![SocketSpec::required("documents", ValueKind::Documents).variadic()]
        }
        fn outputs(&self) -> Vec<SocketSpec> {
            vec![SocketSpec::output("documents", ValueKind::Documents)]
        }
        fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
            let docs = inputs.take_documents("documents")?;
            Ok(SocketValues::new().with("documents", Value::Documents(docs)))
        }
    }
    struct Emit(&'static str);
    impl Component for Emit {
        fn inputs(&self) -> Vec<SocketSpec> {
            Vec::new()
        }
        fn outputs(&self) -> Vec<SocketSpec> {
            vec![SocketSpec::output("documents", ValueKind::Documents)]
        }
        fn run(&self, _inputs: SocketValues) -> Result<SocketValues> {
            let docs = vec![Document::new(self.0)];
            Ok(SocketValues::new().with("documents", Value::Documents(docs)))
        }
    }

    let mut pipe = Pipeline::new();
    pipe.add_component("join", Join).unwrap();
    pipe.add_component("first", Emit("first")).unwrap();
    pipe.add_component("second", Emit("second")).unwrap();
    // Declared second-then-first; execution order is first-then-second.
    pipe.connect("second", "join").unwrap();
    pipe.connect("first", "join").unwrap();

    let result = pipe.run(PipelineInputs::new()).unwrap();
    let Some(Value::Documents(docs)) = result.get("join", "documents") else {
        panic!("expected documents");
    };
    let contents: Vec<_> = docs.iter().map(|d| d.content.as_str()).collect();
    assert_eq!(contents, vec!["second", "first"]);
}

#[test]
fn include_outputs_from_returns_consumed_outputs() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("a", Probe::source("a", &calls)).unwrap();
    pipe.add_component("b", Probe::new("b", &calls)).unwrap();
    pipe.connect("a", "b").unwrap();

    let result = pipe.run(PipelineInputs::new()).unwrap();
    assert_eq!(result.components().collect::<Vec<_>>(), vec!["b"]);

    let result = pipe.run_with(PipelineInputs::new(), &["a"]).unwrap();
    assert_eq!(text(&result, "a", "text"), "a");

    let err = pipe.run_with(PipelineInputs::new(), &["ghost"]).unwrap_err();
    assert!(matches!(err, GraphError::UnknownComponent { .. }));
}

#[test]
fn observer_sees_each_component() {
    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);
    impl RunObserver for Recorder {
        fn component_started(&self, name: &str, position: usize, total: usize) {
            self.0.lock().unwrap().push(format!("start {name} {position}/{total}"));
        }
        fn component_finished(&self, name: &str, _elapsed: Duration) {
            self.0.lock().unwrap().push(format!("done {name}"));
        }
        fn run_finished(&self, _elapsed: Duration) {
            self.0.lock().unwrap().push("finished".into());
        }
    }

    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("a", Probe::source("a", &calls)).unwrap();
    pipe.add_component("b", Probe::new("b", &calls)).unwrap();
    pipe.connect("a", "b").unwrap();

    let recorder = Recorder::default();
    pipe.run_observed(PipelineInputs::new(), &[], &recorder).unwrap();
    assert_eq!(
        *recorder.0.lock().unwrap(),
        vec!["start a 1/2", "done a", "start b 2/2", "done b", "finished"]
    );
}

// ---------------------------------------------------------------------------
// Wiring validation
// ---------------------------------------------------------------------------

#[test]
fn duplicate_names_are_rejected() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("a", Probe::source("a", &calls)).unwrap();
    let err = pipe.add_component("a", Probe::source("a", &calls)).unwrap_err();
    assert!(matches!(err, GraphError::DuplicateName { .. }));
}

#[test]
fn unknown_components_and_sockets() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("a", Probe::source("a", &calls)).unwrap();
    pipe.add_component("b", Probe::new("b", &calls)).unwrap();

    assert!(matches!(
        pipe.connect("a", "nobody").unwrap_err(),
        GraphError::UnknownComponent { name } if name == "nobody"
    ));
    assert!(matches!(
        pipe.connect("a.text", "b.query").unwrap_err(),
        GraphError::InvalidSocket { component, socket, direction: "input" }
            if component == "b" && socket == "query"
    ));
    assert!(matches!(
        pipe.connect("a.embedding", "b").unwrap_err(),
        GraphError::InvalidSocket { direction: "output", .. }
    ));
    assert_eq!(pipe.edges().count(), 0);
}

#[test]
fn repeated_connect_is_a_duplicate_edge() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("a", Probe::source("a", &calls)).unwrap();
    pipe.add_component("b", Probe::new("b", &calls)).unwrap();
    pipe.connect("a.text", "b.text").unwrap();

    assert!(matches!(
        pipe.connect("a.text", "b.text").unwrap_err(),
        GraphError::DuplicateEdge { .. }
    ));
    assert!(matches!(
        pipe.connect("a", "b").unwrap_err(),
        GraphError::DuplicateEdge { .. }
    ));
    assert_eq!(pipe.edges().count(), 1);
}

#[test]
fn second_producer_for_an_input_is_rejected() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("a", Probe::source("a", &calls)).unwrap();
    pipe.add_component("c", Probe::source("c", &calls)).unwrap();
    pipe.add_component("b", Probe::new("b", &calls)).unwrap();
    pipe.connect("a", "b").unwrap();

    let err = pipe.connect("c", "b.text").unwrap_err();
    assert!(matches!(err, GraphError::InputAlreadyConnected { .. }));

    let inputs = PipelineInputs::new().with("b", "text", Value::Text("x".into()));
    assert!(matches!(
        pipe.run(inputs).unwrap_err(),
        GraphError::InputAlreadyConnected { .. }
    ));
}

#[test]
fn socket_inference_needs_exactly_one_pair() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("a", Probe::source("a", &calls)).unwrap();
    let two_texts = vec![
        SocketSpec::required("question", ValueKind::Text),
        SocketSpec::required("context", ValueKind::Text),
    ];
    pipe.add_component("b", Probe::new("b", &calls).with_inputs(two_texts)).unwrap();
    let counts = vec![SocketSpec::required("n", ValueKind::Count)];
    pipe.add_component("c", Probe::new("c", &calls).with_inputs(counts)).unwrap();

    assert!(matches!(
        pipe.connect("a", "b").unwrap_err(),
        GraphError::AmbiguousSocket { candidates, .. } if candidates.len() == 2
    ));
    assert!(matches!(
        pipe.connect("a", "c").unwrap_err(),
        GraphError::TypeMismatch { .. }
    ));
    assert!(matches!(
        pipe.connect("a.text", "c.n").unwrap_err(),
        GraphError::TypeMismatch { .. }
    ));

    // Once `question` is taken, `context` is the only open candidate.
    pipe.connect("a", "b.question").unwrap();
    pipe.connect("a", "b").unwrap();
    let sockets: Vec<_> = pipe.edges().map(|e| e.to_socket.as_str()).collect();
    assert_eq!(sockets, vec!["question", "context"]);
}

#[test]
fn mime_type_socket_names_survive_parsing() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    let mime_outputs = vec![
        SocketSpec::output("text/plain", ValueKind::Text),
        SocketSpec::output("application/vnd.ms-excel", ValueKind::Text),
    ];
    pipe.add_component("router", Probe::source("router", &calls).with_outputs(mime_outputs))
        .unwrap();
    pipe.add_component("plain", Probe::new("plain", &calls)).unwrap();
    pipe.add_component("excel", Probe::new("excel", &calls)).unwrap();
    pipe.connect("router.text/plain", "plain.text").unwrap();
    pipe.connect("router.application/vnd.ms-excel", "excel.text").unwrap();

    let edge = pipe.edges().nth(1).unwrap();
    assert_eq!(edge.from_socket, "application/vnd.ms-excel");
    assert_eq!(edge.to_string(), "router.application/vnd.ms-excel -> excel.text");
}

#[test]
fn payload_is_validated() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("a", Probe::source("a", &calls)).unwrap();

    let err = pipe
        .run(PipelineInputs::new().with("ghost", "text", Value::Text("x".into())))
        .unwrap_err();
    assert!(matches!(err, GraphError::UnknownComponent { .. }));

    let err = pipe
        .run(PipelineInputs::new().with("a", "nope", Value::Text("x".into())))
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidSocket { .. }));

    let err = pipe
        .run(PipelineInputs::new().with("a", "text", Value::Count(1)))
        .unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn repeated_payload_values_need_a_variadic_socket() {
    let calls = counter();
    let mut pipe = Pipeline::new();
    pipe.add_component("a", Probe::new("a", &calls)).unwrap();

    let inputs = PipelineInputs::new()
        .with("a", "text", Value::Text("x".into()))
        .with("a", "text", Value::Text("y".into()));
    let err = pipe.run(inputs).unwrap_err();
    match err {
        GraphError::RepeatedInput { component, socket, count } => {
            assert_eq!((component.as_str(), socket.as_str(), count), ("a", "text", 2));
        }
        other => panic!("expected RepeatedInput, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let mut pipe = Pipeline::new();
    let variadic = vec![SocketSpec::required("text", ValueKind::Text).variadic()];
    pipe.add_component("v", Probe::new("v", &calls).with_inputs(variadic)).unwrap();
    let inputs = PipelineInputs::new()
        .with("v", "text", Value::Text("x".into()))
        .with("v", "text", Value::Text("y".into()));
    let result = pipe.run(inputs).unwrap();
    assert_eq!(text(&result, "v", "text"), "x|y>v");
}
