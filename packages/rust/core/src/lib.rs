//! Pipeline graph runner, components, and workflows for ragpipe.
//!
//! This crate ties the store, converters, and providers together: the
//! [`pipeline`] module runs typed component graphs, [`components`] adapts
//! each capability to a pipeline component, and [`workflows`] wires the
//! end-to-end retrieval-augmented generation flows.

pub mod components;
pub mod pipeline;
pub mod workflows;

pub use pipeline::{
    Component, Edge, GraphError, Pipeline, PipelineInputs, RunObserver, RunResult, SilentRun,
    SocketSpec, SocketValues, Value, ValueKind,
};
pub use workflows::{WorkflowError, WorkflowResult};
