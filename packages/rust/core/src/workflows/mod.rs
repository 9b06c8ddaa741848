//! Retrieval-augmented generation workflows built on [`crate::pipeline`].
//!
//! - [`expenses`]: CSV rows embedded into a store, then interactive Q&A
//! - [`metadata_search`]: BM25 keyword search restricted by a metadata filter
//! - [`multi_format`]: folder ingestion (text, PDF, Markdown, HTML), then Q&A

pub mod expenses;
pub mod metadata_search;
pub mod multi_format;
mod qa;

pub use qa::{Answer, QaParts, ask, qa_pipeline};

use ragpipe_shared::RagPipeError;

use crate::pipeline::GraphError;

/// Errors surfaced by workflow entry points.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Core(#[from] RagPipeError),

    /// A run finished without an output the workflow reads.
    #[error("pipeline produced no '{socket}' output from '{component}'")]
    MissingOutput { component: String, socket: String },
}

impl WorkflowError {
    pub(crate) fn missing(component: &str, socket: &str) -> Self {
        Self::MissingOutput {
            component: component.to_string(),
            socket: socket.to_string(),
        }
    }
}

/// Result alias for workflow entry points.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;
