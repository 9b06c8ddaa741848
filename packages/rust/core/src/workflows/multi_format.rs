//! Multi-format ingestion: route a folder's files by MIME type to
//! converters, join, clean, split, embed, and write them; then answer
//! questions over the indexed chunks.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{info, instrument};

use ragpipe_convert::{CleanerSettings, SplitterSettings, list_files};
use ragpipe_providers::{EmbeddingProvider, GenerationKwargs, TextGenerator};
use ragpipe_store::{DuplicatePolicy, InMemoryDocumentStore};

use super::{QaParts, WorkflowError, WorkflowResult, qa_pipeline};
use crate::components::{
    DocumentCleaner, DocumentEmbedder, DocumentJoiner, DocumentSplitter, DocumentWriter,
    FileConverter, FileTypeRouter,
};
use crate::pipeline::{Pipeline, PipelineInputs, RunObserver, Value};

/// Prompt used to answer questions over the ingested files.
pub const TEMPLATE: &str = "\
Answer the questions based on the given context.

Context:
{% for document in documents %}
    {{ document.content }}
{% endfor %}

Question: {{ question }}
Answer:
";

pub const DEFAULT_QUESTION: &str = "Which of the following recipes would be met with the most disapproval from Ron Swanson? Explain why in Ron Swanson's style of speech";

const ROUTER: &str = "file_type_router";
const WRITER: &str = "document_writer";

/// Converters by component name, paired with the router output feeding each.
fn converters() -> [(&'static str, FileConverter); 4] {
    [
        ("text_file_converter", FileConverter::text()),
        ("pdf_converter", FileConverter::pdf()),
        ("markdown_converter", FileConverter::markdown()),
        ("html_converter", FileConverter::html()),
    ]
}

/// Preprocessing knobs.
#[derive(Debug, Clone, Default)]
pub struct IngestSettings {
    pub cleaner: CleanerSettings,
    pub splitter: SplitterSettings,
    pub policy: DuplicatePolicy,
}

/// Outcome of [`ingest_folder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Files found under the folder, routed or not.
    pub files: usize,
    /// Chunks written to the store.
    pub documents_written: usize,
}

/// Wire router → converters → joiner → cleaner → splitter → embedder → writer.
pub fn preprocessing_pipeline(
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<InMemoryDocumentStore>,
    settings: IngestSettings,
) -> WorkflowResult<Pipeline> {
    let converter_set = converters();
    let mime_types = converter_set.iter().map(|(_, c)| c.format().mime_type());

    let mut pipeline = Pipeline::new();
    pipeline.add_component(ROUTER, FileTypeRouter::new(mime_types)?)?;
    let mut routes = Vec::with_capacity(converter_set.len());
    for (name, converter) in converter_set {
        routes.push((name, converter.format().mime_type()));
        pipeline.add_component(name, converter)?;
    }
    pipeline.add_component("document_joiner", DocumentJoiner::default())?;
    pipeline.add_component("document_cleaner", DocumentCleaner::new(settings.cleaner))?;
    pipeline.add_component("document_splitter", DocumentSplitter::new(settings.splitter))?;
    pipeline.add_component("document_embedder", DocumentEmbedder::new(embedder))?;
    pipeline.add_component(WRITER, DocumentWriter::new(store).with_policy(settings.policy))?;

    for (name, mime) in routes {
        pipeline.connect(&format!("{ROUTER}.{mime}"), &format!("{name}.sources"))?;
        pipeline.connect(name, "document_joiner")?;
    }
    pipeline.connect("document_joiner", "document_cleaner")?;
    pipeline.connect("document_cleaner", "document_splitter")?;
    pipeline.connect("document_splitter", "document_embedder")?;
    pipeline.connect("document_embedder", WRITER)?;
    Ok(pipeline)
}

/// Feed every file under `dir` (recursively) through a pipeline built by
/// [`preprocessing_pipeline`].
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn ingest_folder(
    pipeline: &Pipeline,
    dir: &Path,
    observer: &dyn RunObserver,
) -> WorkflowResult<IngestReport> {
    let start = Instant::now();
    let sources = list_files(dir)?;
    let files = sources.len();
    info!(files, "ingesting folder");

    let inputs = PipelineInputs::new().with(ROUTER, "sources", Value::Sources(sources));
    let mut result = pipeline.run_observed(inputs, &[], observer)?;

    let documents_written = match result.take(WRITER, "documents_written") {
        Some(Value::Count(n)) => n,
        _ => return Err(WorkflowError::missing(WRITER, "documents_written")),
    };
    info!(files, documents_written, elapsed_ms = start.elapsed().as_millis(), "folder ingested");
    Ok(IngestReport {
        files,
        documents_written,
    })
}

/// Build the Q&A pipeline over ingested chunks.
pub fn recipes_pipeline(
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<InMemoryDocumentStore>,
    generator: Box<dyn TextGenerator>,
    top_k: usize,
    max_new_tokens: u32,
) -> WorkflowResult<Pipeline> {
    let mut generation_kwargs = GenerationKwargs::new();
    generation_kwargs.insert("max_new_tokens".into(), json!(max_new_tokens));
    qa_pipeline(QaParts {
        embedder,
        store,
        generator,
        template: TEMPLATE.to_string(),
        top_k,
        generation_kwargs,
    })
}
