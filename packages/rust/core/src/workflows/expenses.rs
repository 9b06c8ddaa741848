//! Expenses Q&A: one document per CSV row, embedded into a store, then
//! questions answered over the rows most similar to each question.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use ragpipe_convert::load_csv_documents;
use ragpipe_providers::{EmbeddingProvider, GenerationKwargs, TextGenerator};
use ragpipe_store::{DuplicatePolicy, InMemoryDocumentStore};

use super::{QaParts, WorkflowResult, qa_pipeline};
use crate::components::DocumentEmbedder;
use crate::pipeline::Pipeline;

/// Prompt used to answer questions over expense rows.
pub const TEMPLATE: &str = "\
Given the following information, answer the question.

Context:
{% for document in documents %}
    {{ document.content }}
{% endfor %}

Question: {{ question }}
Answer:
";

/// Load `csv`, embed every row, and write the rows into `store`.
///
/// Returns the number of documents written.
#[instrument(skip_all, fields(csv = %csv.display(), model = embedder.model()))]
pub fn index_expenses(
    csv: &Path,
    embedder: Arc<dyn EmbeddingProvider>,
    store: &InMemoryDocumentStore,
) -> WorkflowResult<usize> {
    let start = Instant::now();
    let rows = load_csv_documents(csv)?;
    info!(rows = rows.len(), "embedding expense rows");

    let documents = DocumentEmbedder::new(embedder).embed_documents(rows)?;
    let written = store.write_documents(documents, DuplicatePolicy::None)?;

    info!(written, elapsed_ms = start.elapsed().as_millis(), "expenses indexed");
    Ok(written)
}

/// Build the expenses Q&A pipeline over an indexed store.
pub fn expenses_pipeline(
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<InMemoryDocumentStore>,
    generator: Box<dyn TextGenerator>,
    top_k: usize,
) -> WorkflowResult<Pipeline> {
    qa_pipeline(QaParts {
        embedder,
        store,
        generator,
        template: TEMPLATE.to_string(),
        top_k,
        generation_kwargs: GenerationKwargs::new(),
    })
}
