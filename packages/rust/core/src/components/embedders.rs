//! Components that attach dense vectors to queries and documents.

use std::sync::Arc;

use tracing::debug;

use ragpipe_providers::EmbeddingProvider;
use ragpipe_shared::{Document, RagPipeError, Result};

use crate::pipeline::{Component, SocketSpec, SocketValues, Value, ValueKind};

/// Embeds a single query text.
///
/// Use the same provider for queries and for the documents they are
/// compared against.
pub struct TextEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
}

impl TextEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }
}

impl Component for TextEmbedder {
    fn inputs(&self) -> Vec<SocketSpec> {
        vec![SocketSpec::required("text", ValueKind::Text)]
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        vec![SocketSpec::output("embedding", ValueKind::Embedding)]
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let text = inputs.take_text("text")?;
        let embedding = self
            .provider
            .embed(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RagPipeError::Provider(format!(
                    "{} returned no embedding for the query",
                    self.provider.model()
                ))
            })?;
        Ok(SocketValues::new().with("embedding", Value::Embedding(embedding)))
    }
}

/// Embeds every document's content. Ids and content are left untouched.
pub struct DocumentEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
}

impl DocumentEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// Embed `documents` outside a pipeline.
    pub fn embed_documents(&self, documents: Vec<Document>) -> Result<Vec<Document>> {
        if documents.is_empty() {
            return Ok(documents);
        }
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.provider.embed(&texts)?;
        if vectors.len() != documents.len() {
            return Err(RagPipeError::Provider(format!(
                "{} returned {} embeddings for {} documents",
                self.provider.model(),
                vectors.len(),
                documents.len()
            )));
        }
        debug!(model = self.provider.model(), count = documents.len(), "documents embedded");
        Ok(documents
            .into_iter()
            .zip(vectors)
            .map(|(doc, vector)| doc.with_embedding(vector))
            .collect())
    }
}

impl Component for DocumentEmbedder {
    fn inputs(&self) -> Vec<SocketSpec> {
        vec![SocketSpec::required("documents", ValueKind::Documents)]
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        vec![SocketSpec::output("documents", ValueKind::Documents)]
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let documents = self.embed_documents(inputs.take_documents("documents")?)?;
        Ok(SocketValues::new().with("documents", Value::Documents(documents)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragpipe_providers::HashingEmbedder;

    struct Short;

    impl EmbeddingProvider for Short {
        fn model(&self) -> &str {
            "short"
        }

        fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(Vec::new())
        }
    }

    fn hashing() -> Arc<dyn EmbeddingProvider> {
        Arc::new(HashingEmbedder::new(16).unwrap())
    }

    #[test]
    fn text_embedder_emits_one_vector() {
        let embedder = TextEmbedder::new(hashing());
        let mut out = embedder
            .run(SocketValues::new().with("text", Value::Text("rent in march".into())))
            .unwrap();
        assert_eq!(out.take_embedding("embedding").unwrap().len(), 16);
    }

    #[test]
    fn document_embedder_keeps_ids_and_order() {
        let docs = vec![Document::new("first"), Document::new("second")];
        let ids: Vec<_> = docs.iter().map(|d| d.id.clone()).collect();
        let embedded = DocumentEmbedder::new(hashing()).embed_documents(docs).unwrap();
        assert_eq!(embedded.iter().map(|d| d.id.clone()).collect::<Vec<_>>(), ids);
        assert!(embedded.iter().all(|d| d.embedding.as_ref().is_some_and(|e| e.len() == 16)));
        assert_eq!(embedded[1].content, "second");
    }

    #[test]
    fn short_provider_responses_are_errors() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(Short);
        let err = DocumentEmbedder::new(Arc::clone(&provider))
            .embed_documents(vec![Document::new("x")])
            .unwrap_err();
        assert!(err.to_string().contains("0 embeddings for 1 documents"));

        let err = TextEmbedder::new(provider)
            .run(SocketValues::new().with("text", Value::Text("q".into())))
            .unwrap_err();
        assert!(matches!(err, RagPipeError::Provider(_)));
    }
}
