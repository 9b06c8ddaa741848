//! The embed → retrieve → prompt → generate question-answering pipeline
//! shared by the expenses and multi-format workflows.

use std::sync::Arc;

use tracing::{info, instrument};

use ragpipe_providers::{EmbeddingProvider, GenerationKwargs, TextGenerator};
use ragpipe_shared::Document;
use ragpipe_store::InMemoryDocumentStore;

use super::{WorkflowError, WorkflowResult};
use crate::components::{EmbeddingRetriever, Generator, PromptBuilder, TextEmbedder};
use crate::pipeline::{Pipeline, PipelineInputs, RunObserver, Value};

const EMBEDDER: &str = "text_embedder";
const RETRIEVER: &str = "retriever";
const PROMPT_BUILDER: &str = "prompt_builder";
const LLM: &str = "llm";

/// Everything a Q&A pipeline is assembled from.
pub struct QaParts {
    /// Must be the provider the stored documents were embedded with.
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<InMemoryDocumentStore>,
    pub generator: Box<dyn TextGenerator>,
    /// Jinja template reading `documents` and `question`.
    pub template: String,
    pub top_k: usize,
    pub generation_kwargs: GenerationKwargs,
}

/// A generated reply and the documents it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub reply: String,
    pub documents: Vec<Document>,
}

/// Wire `text_embedder → retriever → prompt_builder → llm`.
pub fn qa_pipeline(parts: QaParts) -> WorkflowResult<Pipeline> {
    let mut pipeline = Pipeline::new();
    pipeline.add_component(EMBEDDER, TextEmbedder::new(parts.embedder))?;
    pipeline.add_component(
        RETRIEVER,
        EmbeddingRetriever::new(parts.store).with_top_k(parts.top_k),
    )?;
    pipeline.add_component(PROMPT_BUILDER, PromptBuilder::new(parts.template)?)?;
    pipeline.add_component(
        LLM,
        Generator::new(parts.generator).with_kwargs(parts.generation_kwargs),
    )?;

    pipeline.connect("text_embedder.embedding", "retriever.query_embedding")?;
    pipeline.connect(RETRIEVER, "prompt_builder.documents")?;
    pipeline.connect(PROMPT_BUILDER, LLM)?;
    Ok(pipeline)
}

/// Ask one question through a pipeline built by [`qa_pipeline`].
#[instrument(skip_all, fields(question_chars = question.chars().count()))]
pub fn ask(pipeline: &Pipeline, question: &str, observer: &dyn RunObserver) -> WorkflowResult<Answer> {
    let inputs = PipelineInputs::new()
        .with(EMBEDDER, "text", Value::Text(question.to_string()))
        .with(PROMPT_BUILDER, "question", Value::Text(question.to_string()));
    let mut result = pipeline.run_observed(inputs, &[RETRIEVER], observer)?;

    let reply = match result.take(LLM, "replies") {
        Some(Value::Texts(replies)) => replies.into_iter().next(),
        _ => None,
    }
    .ok_or_else(|| WorkflowError::missing(LLM, "replies"))?;

    let documents = match result.take(RETRIEVER, "documents") {
        Some(Value::Documents(docs)) => docs,
        _ => return Err(WorkflowError::missing(RETRIEVER, "documents")),
    };

    info!(grounding = documents.len(), reply_chars = reply.chars().count(), "question answered");
    Ok(Answer { reply, documents })
}
