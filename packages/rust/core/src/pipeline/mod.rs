//! Pipeline graph runner.
//!
//! A [`Pipeline`] owns named [`Component`]s joined by typed edges from an
//! output socket to an input socket. Edges are checked against the
//! components' socket contracts when they are declared. A run executes
//! every component exactly once, in a stable topological order (Kahn's
//! algorithm, ties broken by insertion order), routing each output to
//! every input it is connected to.
//!
//! Socket references are `"component"` or `"component.socket"`; the socket
//! part is everything after the first `.`, so MIME-type socket names such
//! as `text/plain` work as-is.

mod component;
mod error;
mod observer;
mod value;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use ragpipe_shared::RagPipeError;

pub use component::Component;
pub use error::GraphError;
pub use observer::{RunObserver, SilentRun};
pub use value::{Requirement, SocketSpec, SocketValues, Value, ValueKind};

// ---------------------------------------------------------------------------
// Edges, inputs, results
// ---------------------------------------------------------------------------

/// A directed binding from an output socket to an input socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub from_socket: String,
    pub to: String,
    pub to_socket: String,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.from, self.from_socket, self.to, self.to_socket
        )
    }
}

/// Values supplied at run time: component name → socket name → value.
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    values: BTreeMap<String, SocketValues>,
}

impl PipelineInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`PipelineInputs::insert`].
    pub fn with(mut self, component: &str, socket: &str, value: Value) -> Self {
        self.insert(component, socket, value);
        self
    }

    pub fn insert(&mut self, component: &str, socket: &str, value: Value) {
        self.values
            .entry(component.to_string())
            .or_default()
            .push(socket, value);
    }
}

/// Outputs returned from a run: component name → socket name → value.
///
/// Holds every output no edge consumes, plus all outputs of components
/// that received run-time inputs or were explicitly requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    outputs: BTreeMap<String, BTreeMap<String, Value>>,
}

impl RunResult {
    fn insert(&mut self, component: &str, socket: &str, value: Value) {
        self.outputs
            .entry(component.to_string())
            .or_default()
            .insert(socket.to_string(), value);
    }

    pub fn get(&self, component: &str, socket: &str) -> Option<&Value> {
        self.outputs.get(component)?.get(socket)
    }

    pub fn take(&mut self, component: &str, socket: &str) -> Option<Value> {
        self.outputs.get_mut(component)?.remove(socket)
    }

    pub fn component(&self, name: &str) -> Option<&BTreeMap<String, Value>> {
        self.outputs.get(name)
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

struct Node {
    name: String,
    component: Box<dyn Component>,
    inputs: Vec<SocketSpec>,
    outputs: Vec<SocketSpec>,
}

struct Link {
    from: usize,
    to: usize,
    edge: Edge,
}

/// A directed acyclic graph of named components.
#[derive(Default)]
pub struct Pipeline {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    links: Vec<Link>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("components", &self.component_names())
            .field("edges", &self.links.iter().map(|l| l.edge.to_string()).collect::<Vec<_>>())
            .finish()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component under a unique name.
    pub fn add_component(
        &mut self,
        name: &str,
        component: impl Component + 'static,
    ) -> Result<(), GraphError> {
        if self.index.contains_key(name) {
            return Err(GraphError::DuplicateName {
                name: name.to_string(),
            });
        }
        let node = Node {
            name: name.to_string(),
            inputs: component.inputs(),
            outputs: component.outputs(),
            component: Box::new(component),
        };
        self.index.insert(name.to_string(), self.nodes.len());
        self.nodes.push(node);
        debug!(component = name, "component added");
        Ok(())
    }

    /// Connect `from` (`"component"` or `"component.socket"`) to `to`.
    ///
    /// An omitted socket name is inferred: among the sockets on that side
    /// (for inputs, those still open) exactly one pair must have matching
    /// kinds.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let (from_name, from_socket) = parse_ref(from);
        let (to_name, to_socket) = parse_ref(to);
        let from_idx = self.node_index(from_name)?;
        let to_idx = self.node_index(to_name)?;
        let (source, target) = (&self.nodes[from_idx], &self.nodes[to_idx]);

        let outputs = select_sockets(source, &source.outputs, from_socket, "output")?;
        let inputs = select_sockets(target, &target.inputs, to_socket, "input")?;

        let pairs: Vec<(&SocketSpec, &SocketSpec)> = outputs
            .iter()
            .flat_map(|&out| {
                inputs
                    .iter()
                    .filter(move |inp| inp.kind == out.kind)
                    .map(move |&inp| (out, inp))
            })
            .collect();

        if pairs.is_empty() {
            return Err(GraphError::TypeMismatch {
                from: from.to_string(),
                to: to.to_string(),
                detail: format!(
                    "no compatible sockets (outputs {}, inputs {})",
                    describe(&outputs),
                    describe(&inputs)
                ),
            });
        }

        let open: Vec<(&SocketSpec, &SocketSpec)> = pairs
            .iter()
            .copied()
            .filter(|(_, inp)| inp.variadic || !self.is_connected(to_idx, &inp.name))
            .collect();

        let (out, inp) = match open.as_slice() {
            [single] => *single,
            [] => pairs
                .iter()
                .copied()
                .find(|(o, i)| self.has_edge(from_idx, &o.name, to_idx, &i.name))
                .unwrap_or(pairs[0]),
            _ => {
                return Err(GraphError::AmbiguousSocket {
                    from: from.to_string(),
                    to: to.to_string(),
                    candidates: open
                        .iter()
                        .map(|(o, i)| format!("{from_name}.{} -> {to_name}.{}", o.name, i.name))
                        .collect(),
                });
            }
        };

        let edge = Edge {
            from: source.name.clone(),
            from_socket: out.name.clone(),
            to: target.name.clone(),
            to_socket: inp.name.clone(),
        };
        let variadic = inp.variadic;

        if self.has_edge(from_idx, &edge.from_socket, to_idx, &edge.to_socket) {
            return Err(GraphError::DuplicateEdge {
                from: format!("{}.{}", edge.from, edge.from_socket),
                to: format!("{}.{}", edge.to, edge.to_socket),
            });
        }
        if !variadic && self.is_connected(to_idx, &edge.to_socket) {
            return Err(GraphError::InputAlreadyConnected {
                component: edge.to,
                socket: edge.to_socket,
            });
        }

        debug!(edge = %edge, "connected");
        self.links.push(Link {
            from: from_idx,
            to: to_idx,
            edge,
        });
        Ok(())
    }

    // --- introspection ---

    /// Component names in insertion order.
    pub fn component_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Edges in declaration order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.links.iter().map(|l| &l.edge)
    }

    /// The order a run would invoke components in.
    pub fn execution_order(&self) -> Result<Vec<&str>, GraphError> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|i| self.nodes[i].name.as_str())
            .collect())
    }

    // --- running ---

    /// Run with run-time inputs, returning terminal outputs.
    pub fn run(&self, inputs: PipelineInputs) -> Result<RunResult, GraphError> {
        self.run_observed(inputs, &[], &SilentRun)
    }

    /// Run, additionally returning every output of the named components.
    pub fn run_with(
        &self,
        inputs: PipelineInputs,
        include_outputs_from: &[&str],
    ) -> Result<RunResult, GraphError> {
        self.run_observed(inputs, include_outputs_from, &SilentRun)
    }

    /// Run, reporting progress to `observer`.
    ///
    /// Nothing executes unless the payload is valid, the graph is acyclic,
    /// and every required input is fed. The first component error aborts
    /// the run.
    #[instrument(skip_all, fields(components = self.nodes.len(), edges = self.links.len()))]
    pub fn run_observed(
        &self,
        mut inputs: PipelineInputs,
        include_outputs_from: &[&str],
        observer: &dyn RunObserver,
    ) -> Result<RunResult, GraphError> {
        let start = Instant::now();

        self.validate_payload(&inputs)?;
        for name in include_outputs_from {
            self.node_index(name)?;
        }
        let order = self.topological_order()?;
        self.check_wiring(&inputs)?;

        let mut keep_all: HashSet<usize> = inputs
            .values
            .keys()
            .filter_map(|name| self.index.get(name).copied())
            .collect();
        keep_all.extend(include_outputs_from.iter().filter_map(|n| self.index.get(*n).copied()));
        let consumed: HashSet<(usize, &str)> = self
            .links
            .iter()
            .map(|l| (l.from, l.edge.from_socket.as_str()))
            .collect();

        let mut produced: HashMap<usize, BTreeMap<String, Value>> = HashMap::new();
        let mut result = RunResult::default();
        let total = order.len();

        for (position, idx) in order.into_iter().enumerate() {
            let node = &self.nodes[idx];
            let payload = inputs.values.remove(&node.name).unwrap_or_default();
            let socket_values = self.gather_inputs(idx, payload, &produced)?;

            observer.component_started(&node.name, position + 1, total);
            debug!(component = %node.name, position = position + 1, total, "running component");
            let started = Instant::now();

            let outputs = node.component.run(socket_values).map_err(|source| {
                warn!(component = %node.name, error = %source, "component failed, aborting run");
                GraphError::ComponentExecution {
                    component: node.name.clone(),
                    source,
                }
            })?;
            observer.component_finished(&node.name, started.elapsed());

            for (socket, value) in outputs.into_single_values() {
                let Some(spec) = node.outputs.iter().find(|s| s.name == socket) else {
                    warn!(component = %node.name, %socket, "ignoring undeclared output");
                    continue;
                };
                if spec.kind != value.kind() {
                    return Err(GraphError::ComponentExecution {
                        component: node.name.clone(),
                        source: RagPipeError::validation(format!(
                            "output '{socket}' declared {} but produced {}",
                            spec.kind,
                            value.kind()
                        )),
                    });
                }

                let is_consumed = consumed.contains(&(idx, socket.as_str()));
                if keep_all.contains(&idx) || !is_consumed {
                    result.insert(&node.name, &socket, value.clone());
                }
                if is_consumed {
                    produced.entry(idx).or_default().insert(socket, value);
                }
            }
        }

        let elapsed = start.elapsed();
        observer.run_finished(elapsed);
        info!(components = total, elapsed_ms = elapsed.as_millis(), "pipeline run complete");
        Ok(result)
    }

    // --- internals ---

    fn node_index(&self, name: &str) -> Result<usize, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownComponent {
                name: name.to_string(),
            })
    }

    fn is_connected(&self, to: usize, socket: &str) -> bool {
        self.links
            .iter()
            .any(|l| l.to == to && l.edge.to_socket == socket)
    }

    fn has_edge(&self, from: usize, from_socket: &str, to: usize, to_socket: &str) -> bool {
        self.links.iter().any(|l| {
            l.from == from
                && l.to == to
                && l.edge.from_socket == from_socket
                && l.edge.to_socket == to_socket
        })
    }

    /// Kahn's algorithm; among ready components the earliest added goes first.
    fn topological_order(&self) -> Result<Vec<usize>, GraphError> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for link in &self.links {
            in_degree[link.to] += 1;
            successors[link.from].push(link.to);
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &next in &successors[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < n {
            let stalled = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.nodes[i].name.clone())
                .collect();
            return Err(GraphError::UnresolvedGraph { components: stalled });
        }
        Ok(order)
    }

    fn validate_payload(&self, inputs: &PipelineInputs) -> Result<(), GraphError> {
        for (component, values) in &inputs.values {
            let idx = self.node_index(component)?;
            let node = &self.nodes[idx];
            for (socket, value) in values.iter() {
                let spec = node.inputs.iter().find(|s| s.name == socket).ok_or_else(|| {
                    GraphError::InvalidSocket {
                        component: component.clone(),
                        socket: socket.to_string(),
                        direction: "input",
                    }
                })?;
                let count = values.count(socket);
                if !spec.variadic && count > 1 {
                    return Err(GraphError::RepeatedInput {
                        component: component.clone(),
                        socket: socket.to_string(),
                        count,
                    });
                }
                if !spec.variadic && self.is_connected(idx, socket) {
                    return Err(GraphError::InputAlreadyConnected {
                        component: component.clone(),
                        socket: socket.to_string(),
                    });
                }
                if spec.kind != value.kind() {
                    return Err(GraphError::TypeMismatch {
                        from: "run input".to_string(),
                        to: format!("{component}.{socket}"),
                        detail: format!("expected {}, got {}", spec.kind, value.kind()),
                    });
                }
            }
        }
        Ok(())
    }

    /// Every required input must have an edge or a run-time value.
    fn check_wiring(&self, inputs: &PipelineInputs) -> Result<(), GraphError> {
        let stalled: Vec<String> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(idx, node)| {
                node.inputs.iter().any(|spec| {
                    spec.is_required()
                        && !self.is_connected(*idx, &spec.name)
                        && !inputs
                            .values
                            .get(&node.name)
                            .is_some_and(|v| v.contains(&spec.name))
                })
            })
            .map(|(_, node)| node.name.clone())
            .collect();

        if stalled.is_empty() {
            Ok(())
        } else {
            Err(GraphError::UnresolvedGraph { components: stalled })
        }
    }

    /// Collect a component's inputs: run-time values first, then edge
    /// contributions in declaration order, then defaults.
    fn gather_inputs(
        &self,
        idx: usize,
        mut payload: SocketValues,
        produced: &HashMap<usize, BTreeMap<String, Value>>,
    ) -> Result<SocketValues, GraphError> {
        let node = &self.nodes[idx];
        let mut values = SocketValues::new();

        for spec in &node.inputs {
            let mut fed = false;
            for value in payload.take_all(&spec.name) {
                values.push(spec.name.clone(), value);
                fed = true;
            }
            for link in self
                .links
                .iter()
                .filter(|l| l.to == idx && l.edge.to_socket == spec.name)
            {
                let upstream = produced
                    .get(&link.from)
                    .and_then(|outputs| outputs.get(&link.edge.from_socket));
                if let Some(value) = upstream {
                    values.push(spec.name.clone(), value.clone());
                    fed = true;
                }
            }
            if fed {
                continue;
            }
            match &spec.requirement {
                Requirement::Required => {
                    warn!(component = %node.name, socket = %spec.name, "required input never produced");
                    return Err(GraphError::UnresolvedGraph {
                        components: vec![node.name.clone()],
                    });
                }
                Requirement::Optional(Some(default)) => {
                    values.push(spec.name.clone(), default.clone());
                }
                Requirement::Optional(None) => {}
            }
        }
        Ok(values)
    }
}

fn parse_ref(reference: &str) -> (&str, Option<&str>) {
    match reference.split_once('.') {
        Some((component, socket)) => (component, Some(socket)),
        None => (reference, None),
    }
}

fn select_sockets<'a>(
    node: &Node,
    specs: &'a [SocketSpec],
    explicit: Option<&str>,
    direction: &'static str,
) -> Result<Vec<&'a SocketSpec>, GraphError> {
    match explicit {
        None => Ok(specs.iter().collect()),
        Some(name) => specs
            .iter()
            .find(|s| s.name == name)
            .map(|s| vec![s])
            .ok_or_else(|| GraphError::InvalidSocket {
                component: node.name.clone(),
                socket: name.to_string(),
                direction,
            }),
    }
}

fn describe(specs: &[&SocketSpec]) -> String {
    let parts: Vec<String> = specs.iter().map(|s| format!("{}: {}", s.name, s.kind)).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests;
