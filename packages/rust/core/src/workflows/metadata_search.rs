//! Keyword search over versioned documents, restricted by a metadata filter.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use ragpipe_shared::{Document, Meta};
use ragpipe_store::{
    Bm25Algorithm, Bm25Params, DuplicatePolicy, Filter, InMemoryDocumentStore, StoreSettings,
};

use super::{WorkflowError, WorkflowResult};
use crate::components::Bm25Retriever;
use crate::pipeline::{Pipeline, PipelineInputs, RunObserver, Value};

pub const DEFAULT_QUERY: &str = "Haystack installation";

/// Only documents with `meta.version` above this are searched by default.
pub const DEFAULT_MIN_VERSION: f64 = 1.21;

const RETRIEVER: &str = "retriever";

/// Installation notes for three releases.
pub fn versioned_documents() -> Vec<Document> {
    [
        (
            "Use pip to install a basic version of Haystack's latest release: pip install farm-haystack. All the core Haystack components live in the haystack repo. But there's also the haystack-extras repo which contains components that are not as widely used, and you need to install them separately.",
            1.15,
            "2023-03-30T00:00:00",
        ),
        (
            "Use pip to install a basic version of Haystack's latest release: pip install farm-haystack[inference]. All the core Haystack components live in the haystack repo. But there's also the haystack-extras repo which contains components that are not as widely used, and you need to install them separately.",
            1.22,
            "2023-11-07T00:00:00",
        ),
        (
            "Use pip to install only the Haystack 2.0 code: pip install haystack-ai. The haystack-ai package is built on the main branch which is an unstable beta version, but it's useful if you want to try the new features as soon as they are merged.",
            2.0,
            "2023-12-04T00:00:00",
        ),
    ]
    .into_iter()
    .map(|(content, version, date)| {
        let mut meta = Meta::new();
        meta.insert("version".into(), json!(version));
        meta.insert("date".into(), json!(date));
        Document::with_meta(content, meta)
    })
    .collect()
}

/// A BM25Plus store holding [`versioned_documents`].
pub fn versioned_store() -> WorkflowResult<Arc<InMemoryDocumentStore>> {
    let store = InMemoryDocumentStore::with_settings(StoreSettings {
        bm25: Bm25Params::new(Bm25Algorithm::Plus),
        ..StoreSettings::default()
    });
    store.write_documents(versioned_documents(), DuplicatePolicy::None)?;
    Ok(Arc::new(store))
}

/// A single-retriever pipeline over `store`.
pub fn search_pipeline(store: Arc<InMemoryDocumentStore>) -> WorkflowResult<Pipeline> {
    let mut pipeline = Pipeline::new();
    pipeline.add_component(RETRIEVER, Bm25Retriever::new(store))?;
    Ok(pipeline)
}

/// Run `query` against documents whose `meta.version` exceeds `min_version`,
/// best match first.
#[instrument(skip_all, fields(%query, min_version))]
pub fn search(
    pipeline: &Pipeline,
    query: &str,
    min_version: f64,
    observer: &dyn RunObserver,
) -> WorkflowResult<Vec<Document>> {
    let filter = Filter::greater_than("meta.version", json!(min_version));
    let inputs = PipelineInputs::new()
        .with(RETRIEVER, "query", Value::Text(query.to_string()))
        .with(RETRIEVER, "filters", Value::Filter(filter));

    let mut result = pipeline.run_observed(inputs, &[], observer)?;
    let documents = match result.take(RETRIEVER, "documents") {
        Some(Value::Documents(docs)) => docs,
        _ => return Err(WorkflowError::missing(RETRIEVER, "documents")),
    };
    info!(hits = documents.len(), "search complete");
    Ok(documents)
}
