//! Graph construction and execution errors.

use ragpipe_shared::RagPipeError;

/// Errors raised while wiring or running a [`super::Pipeline`].
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("a component named '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("no component named '{name}'")]
    UnknownComponent { name: String },

    #[error("component '{component}' has no {direction} socket '{socket}'")]
    InvalidSocket {
        component: String,
        socket: String,
        direction: &'static str,
    },

    #[error("cannot infer sockets for {from} -> {to}: candidates {candidates:?}")]
    AmbiguousSocket {
        from: String,
        to: String,
        candidates: Vec<String>,
    },

    #[error("cannot connect {from} -> {to}: {detail}")]
    TypeMismatch {
        from: String,
        to: String,
        detail: String,
    },

    #[error("edge {from} -> {to} already exists")]
    DuplicateEdge { from: String, to: String },

    #[error("input '{component}.{socket}' is already connected")]
    InputAlreadyConnected { component: String, socket: String },

    #[error("input '{component}.{socket}' accepts one value, got {count}")]
    RepeatedInput {
        component: String,
        socket: String,
        count: usize,
    },

    #[error("component '{component}' failed: {source}")]
    ComponentExecution {
        component: String,
        source: RagPipeError,
    },

    #[error("pipeline cannot make progress; stalled components: {components:?}")]
    UnresolvedGraph { components: Vec<String> },
}

impl GraphError {
    /// Wiring errors can be fixed before a run; execution errors cannot.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::ComponentExecution { .. })
    }

    /// The component whose `run` failed, if this is an execution error.
    pub fn failed_component(&self) -> Option<&str> {
        match self {
            Self::ComponentExecution { component, .. } => Some(component),
            _ => None,
        }
    }
}
