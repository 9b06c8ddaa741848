//! In-memory document store with keyword and embedding retrieval.
//!
//! The [`InMemoryDocumentStore`] keeps documents in insertion order, maintains
//! BM25 corpus statistics as documents are written and deleted, and scores
//! candidates exhaustively for both retrieval modes. Metadata [`Filter`]s
//! narrow the candidate set before scoring.
//!
//! The store is shared by reference (`Arc<InMemoryDocumentStore>`) between the
//! writer that fills it and the retrievers that read it.

pub mod bm25;
pub mod filters;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, instrument};

use ragpipe_shared::{AppConfig, Document, DocumentId, RagPipeError, Result};

pub use bm25::{Bm25Algorithm, Bm25Params, tokenize};
pub use filters::{ComparisonOp, Filter, LogicalOp};

use bm25::{BM25_SCALING_FACTOR, CorpusStats, DocStats};

/// Scaling factor for dot-product scores before the sigmoid.
const DOT_PRODUCT_SCALING_FACTOR: f64 = 100.0;

// ---------------------------------------------------------------------------
// Policies and settings
// ---------------------------------------------------------------------------

/// What to do when a written document's id is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Store default; behaves like `Fail`.
    #[default]
    None,
    /// Keep the stored document, ignore the new one.
    Skip,
    /// Replace the stored document.
    Overwrite,
    /// Reject the write.
    Fail,
}

impl FromStr for DuplicatePolicy {
    type Err = RagPipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "skip" => Ok(Self::Skip),
            "overwrite" => Ok(Self::Overwrite),
            "fail" => Ok(Self::Fail),
            _ => Err(RagPipeError::validation(format!(
                "unknown duplicate policy '{s}': expected none, skip, overwrite, or fail"
            ))),
        }
    }
}

/// Vector similarity used by embedding retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Similarity {
    #[default]
    DotProduct,
    Cosine,
}

impl FromStr for Similarity {
    type Err = RagPipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dot_product" => Ok(Self::DotProduct),
            "cosine" => Ok(Self::Cosine),
            _ => Err(RagPipeError::config(format!(
                "unknown similarity '{s}': expected dot_product or cosine"
            ))),
        }
    }
}

/// Scoring configuration for a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreSettings {
    pub bm25: Bm25Params,
    pub similarity: Similarity,
}

impl TryFrom<&AppConfig> for StoreSettings {
    type Error = RagPipeError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            bm25: Bm25Params::try_from(&config.bm25)?,
            similarity: config.embedding.similarity.parse()?,
        })
    }
}

/// Per-query retrieval options.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Restrict candidates before scoring.
    pub filters: Option<Filter>,
    /// Maximum number of documents returned.
    pub top_k: usize,
    /// Map raw scores into `[0, 1]`.
    pub scale_score: bool,
    /// Keep embeddings on the returned documents.
    pub return_embedding: bool,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            filters: None,
            top_k: 10,
            scale_score: false,
            return_embedding: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    /// Documents in insertion order.
    documents: Vec<Document>,
    /// Term statistics keyed by document id.
    doc_stats: HashMap<DocumentId, DocStats>,
    corpus: CorpusStats,
}

impl StoreState {
    fn position(&self, id: &DocumentId) -> Option<usize> {
        self.documents.iter().position(|d| &d.id == id)
    }

    fn insert(&mut self, doc: Document) {
        let stats = DocStats::from_text(&doc.content);
        self.corpus.add(&stats);
        self.doc_stats.insert(doc.id.clone(), stats);
        self.documents.push(doc);
    }

    /// Swap in a document at an existing position, keeping its place in
    /// insertion order.
    fn replace_at(&mut self, position: usize, doc: Document) {
        let stats = DocStats::from_text(&doc.content);
        if let Some(old) = self.doc_stats.remove(&self.documents[position].id) {
            self.corpus.remove(&old);
        }
        self.corpus.add(&stats);
        self.doc_stats.insert(doc.id.clone(), stats);
        self.documents[position] = doc;
    }

    fn remove_at(&mut self, position: usize) -> Document {
        let doc = self.documents.remove(position);
        if let Some(stats) = self.doc_stats.remove(&doc.id) {
            self.corpus.remove(&stats);
        }
        doc
    }

    fn filtered(&self, filters: Option<&Filter>) -> Result<Vec<&Document>> {
        let mut out = Vec::new();
        for doc in &self.documents {
            let keep = match filters {
                Some(filter) => filter.matches(doc)?,
                None => true,
            };
            if keep {
                out.push(doc);
            }
        }
        Ok(out)
    }
}

/// Document store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    state: RwLock<StoreState>,
    settings: StoreSettings,
}

impl InMemoryDocumentStore {
    /// Create an empty store with default scoring (BM25L, dot product).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with explicit scoring settings.
    pub fn with_settings(settings: StoreSettings) -> Self {
        Self {
            state: RwLock::default(),
            settings,
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored documents.
    pub fn count_documents(&self) -> usize {
        self.read().documents.len()
    }

    /// Write documents, applying the duplicate policy per document.
    ///
    /// Returns the number of documents actually written. With `Fail` (or
    /// `None`) the first duplicate aborts the call; documents before it in the
    /// batch stay written.
    #[instrument(skip_all, fields(count = documents.len(), ?policy))]
    pub fn write_documents(&self, documents: Vec<Document>, policy: DuplicatePolicy) -> Result<usize> {
        let mut state = self.write();
        let mut written = 0;

        for doc in documents {
            match (state.position(&doc.id), policy) {
                (None, _) => state.insert(doc),
                (Some(_), DuplicatePolicy::Skip) => {
                    debug!(id = %doc.id, "duplicate document skipped");
                    continue;
                }
                (Some(pos), DuplicatePolicy::Overwrite) => state.replace_at(pos, doc),
                (Some(_), DuplicatePolicy::Fail | DuplicatePolicy::None) => {
                    return Err(RagPipeError::DuplicateDocument {
                        id: doc.id.to_string(),
                    });
                }
            }
            written += 1;
        }

        info!(written, total = state.documents.len(), "documents written");
        Ok(written)
    }

    /// Return all documents matching the filter, in insertion order.
    pub fn filter_documents(&self, filters: Option<&Filter>) -> Result<Vec<Document>> {
        let state = self.read();
        Ok(state.filtered(filters)?.into_iter().cloned().collect())
    }

    /// Delete documents by id; unknown ids are ignored.
    pub fn delete_documents(&self, ids: &[DocumentId]) -> usize {
        let mut state = self.write();
        let mut deleted = 0;
        for id in ids {
            if let Some(pos) = state.position(id) {
                state.remove_at(pos);
                deleted += 1;
            }
        }
        deleted
    }

    /// Rank documents against a keyword query with the configured BM25 variant.
    ///
    /// Corpus statistics cover the whole store; filters only restrict which
    /// documents are returned. Documents scoring zero are dropped.
    #[instrument(skip_all, fields(query = %query, top_k = options.top_k))]
    pub fn bm25_retrieval(&self, query: &str, options: &RetrievalOptions) -> Result<Vec<Document>> {
        if query.trim().is_empty() {
            return Err(RagPipeError::validation("BM25 query must not be empty"));
        }

        let state = self.read();
        let params = &self.settings.bm25;
        let query_tokens = bm25::tokenize(query);
        let idf = state.corpus.idf(params, &query_tokens);

        let candidates = state.filtered(options.filters.as_ref())?;
        let mut scored: Vec<(&Document, f64)> = candidates
            .into_iter()
            .filter_map(|doc| {
                let stats = state.doc_stats.get(&doc.id)?;
                let score = state.corpus.score(params, &idf, &query_tokens, stats);
                (score > 0.0).then_some((doc, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(options.top_k);

        debug!(hits = scored.len(), "bm25 retrieval complete");

        Ok(scored
            .into_iter()
            .map(|(doc, score)| {
                let score = if options.scale_score {
                    sigmoid(score / BM25_SCALING_FACTOR)
                } else {
                    score
                };
                finish(doc, score, options.return_embedding)
            })
            .collect())
    }

    /// Rank documents by similarity between their embedding and the query's.
    ///
    /// Documents without an embedding are skipped.
    #[instrument(skip_all, fields(dims = query_embedding.len(), top_k = options.top_k))]
    pub fn embedding_retrieval(
        &self,
        query_embedding: &[f32],
        options: &RetrievalOptions,
    ) -> Result<Vec<Document>> {
        if query_embedding.is_empty() {
            return Err(RagPipeError::validation("query embedding must not be empty"));
        }

        let state = self.read();
        let candidates = state.filtered(options.filters.as_ref())?;
        let similarity = self.settings.similarity;

        let mut scored: Vec<(&Document, f64)> = Vec::with_capacity(candidates.len());
        let mut skipped = 0usize;
        for doc in candidates {
            let Some(embedding) = doc.embedding.as_deref() else {
                skipped += 1;
                continue;
            };
            if embedding.len() != query_embedding.len() {
                return Err(RagPipeError::validation(format!(
                    "embedding size mismatch for document {}: {} vs query {}",
                    doc.id,
                    embedding.len(),
                    query_embedding.len()
                )));
            }
            scored.push((doc, similarity_score(similarity, query_embedding, embedding)));
        }

        if skipped > 0 {
            debug!(skipped, "documents without embeddings skipped");
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(options.top_k);

        Ok(scored
            .into_iter()
            .map(|(doc, score)| {
                let score = match (options.scale_score, similarity) {
                    (false, _) => score,
                    (true, Similarity::DotProduct) => sigmoid(score / DOT_PRODUCT_SCALING_FACTOR),
                    (true, Similarity::Cosine) => (score + 1.0) / 2.0,
                };
                finish(doc, score, options.return_embedding)
            })
            .collect())
    }
}

fn finish(doc: &Document, score: f64, return_embedding: bool) -> Document {
    let mut out = doc.clone().with_score(score);
    if !return_embedding {
        out.embedding = None;
    }
    out
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn similarity_score(similarity: Similarity, a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    match similarity {
        Similarity::DotProduct => dot,
        Similarity::Cosine => {
            let norm_a = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
            let norm_b = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                dot / (norm_a * norm_b)
            }
        }
    }
}
