//! Retrievers over a shared [`InMemoryDocumentStore`].
//!
//! Both retrievers take optional `filters` and `top_k` inputs. Values fed at
//! run time replace the ones the retriever was built with.

use std::sync::Arc;

use tracing::debug;

use ragpipe_shared::Result;
use ragpipe_store::{Filter, InMemoryDocumentStore, RetrievalOptions};

use crate::pipeline::{Component, SocketSpec, SocketValues, Value, ValueKind};

fn shared_inputs(first: SocketSpec) -> Vec<SocketSpec> {
    vec![
        first,
        SocketSpec::optional("filters", ValueKind::Filter),
        SocketSpec::optional("top_k", ValueKind::Count),
    ]
}

fn documents_output() -> Vec<SocketSpec> {
    vec![SocketSpec::output("documents", ValueKind::Documents)]
}

/// Merge run-time overrides into the retriever's defaults.
fn options_for(defaults: &RetrievalOptions, inputs: &mut SocketValues) -> Result<RetrievalOptions> {
    let mut options = defaults.clone();
    if let Some(filters) = inputs.take_optional_filter("filters")? {
        options.filters = Some(filters);
    }
    if let Some(top_k) = inputs.take_optional_count("top_k")? {
        options.top_k = top_k;
    }
    Ok(options)
}

macro_rules! option_builders {
    ($ty:ty) => {
        impl $ty {
            /// Default number of documents returned.
            pub fn with_top_k(mut self, top_k: usize) -> Self {
                self.options.top_k = top_k;
                self
            }

            /// Filter applied when none is fed at run time.
            pub fn with_filters(mut self, filters: Filter) -> Self {
                self.options.filters = Some(filters);
                self
            }

            pub fn with_scale_score(mut self, scale_score: bool) -> Self {
                self.options.scale_score = scale_score;
                self
            }
        }
    };
}

/// Ranks stored documents against a query embedding.
pub struct EmbeddingRetriever {
    store: Arc<InMemoryDocumentStore>,
    options: RetrievalOptions,
}

impl EmbeddingRetriever {
    pub fn new(store: Arc<InMemoryDocumentStore>) -> Self {
        Self {
            store,
            options: RetrievalOptions::default(),
        }
    }
}

option_builders!(EmbeddingRetriever);

impl Component for EmbeddingRetriever {
    fn inputs(&self) -> Vec<SocketSpec> {
        shared_inputs(SocketSpec::required("query_embedding", ValueKind::Embedding))
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        documents_output()
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let query = inputs.take_embedding("query_embedding")?;
        let options = options_for(&self.options, &mut inputs)?;
        let documents = self.store.embedding_retrieval(&query, &options)?;
        debug!(hits = documents.len(), "embedding retriever done");
        Ok(SocketValues::new().with("documents", Value::Documents(documents)))
    }
}

/// Ranks stored documents against a keyword query.
pub struct Bm25Retriever {
    store: Arc<InMemoryDocumentStore>,
    options: RetrievalOptions,
}

impl Bm25Retriever {
    pub fn new(store: Arc<InMemoryDocumentStore>) -> Self {
        Self {
            store,
            options: RetrievalOptions::default(),
        }
    }
}

option_builders!(Bm25Retriever);

impl Component for Bm25Retriever {
    fn inputs(&self) -> Vec<SocketSpec> {
        shared_inputs(SocketSpec::required("query", ValueKind::Text))
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        documents_output()
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let query = inputs.take_text("query")?;
        let options = options_for(&self.options, &mut inputs)?;
        let documents = self.store.bm25_retrieval(&query, &options)?;
        debug!(hits = documents.len(), "bm25 retriever done");
        Ok(SocketValues::new().with("documents", Value::Documents(documents)))
    }
}
