//! Joining several document lists into one.

use std::collections::HashMap;
use std::str::FromStr;

use tracing::debug;

use ragpipe_shared::{Document, DocumentId, RagPipeError, Result};

use crate::pipeline::{Component, SocketSpec, SocketValues, Value, ValueKind};

/// Reciprocal rank fusion constant.
const RRF_K: f64 = 61.0;

/// How document lists are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinMode {
    /// Keep every document once, with its best score.
    #[default]
    Concatenate,
    /// Weighted sum of each document's scores across lists.
    Merge,
    /// Weighted reciprocal rank fusion.
    ReciprocalRankFusion,
}

impl FromStr for JoinMode {
    type Err = RagPipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "concatenate" => Ok(Self::Concatenate),
            "merge" => Ok(Self::Merge),
            "reciprocal_rank_fusion" => Ok(Self::ReciprocalRankFusion),
            _ => Err(RagPipeError::validation(format!(
                "unknown join mode '{s}': expected concatenate, merge, or reciprocal_rank_fusion"
            ))),
        }
    }
}

/// Joins the document lists fed to its variadic `documents` input.
///
/// Each edge (or run-time value) into `documents` counts as one list, in the
/// order the edges were declared.
#[derive(Debug, Clone)]
pub struct DocumentJoiner {
    mode: JoinMode,
    weights: Option<Vec<f64>>,
    top_k: Option<usize>,
    sort_by_score: bool,
}

impl Default for DocumentJoiner {
    fn default() -> Self {
        Self {
            mode: JoinMode::default(),
            weights: None,
            top_k: None,
            sort_by_score: true,
        }
    }
}

impl DocumentJoiner {
    pub fn new(mode: JoinMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Per-list weights for merge and fusion; normalised to sum to 1.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self> {
        let total: f64 = weights.iter().sum();
        if weights.is_empty() || weights.iter().any(|w| *w < 0.0) || total <= 0.0 {
            return Err(RagPipeError::validation(
                "joiner weights must be non-negative with a positive sum",
            ));
        }
        self.weights = Some(weights.into_iter().map(|w| w / total).collect());
        Ok(self)
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_sort_by_score(mut self, sort_by_score: bool) -> Self {
        self.sort_by_score = sort_by_score;
        self
    }

    /// Join `lists` and apply sorting and `top_k`.
    pub fn join(&self, lists: Vec<Vec<Document>>, top_k: Option<usize>) -> Vec<Document> {
        let mut joined = match self.mode {
            JoinMode::Concatenate => concatenate(lists),
            JoinMode::Merge => self.merge(lists),
            JoinMode::ReciprocalRankFusion => self.reciprocal_rank_fusion(lists),
        };

        if self.sort_by_score {
            // Stable: equal scores keep their first-appearance order.
            joined.sort_by(|a, b| {
                let a = a.score.unwrap_or(f64::NEG_INFINITY);
                let b = b.score.unwrap_or(f64::NEG_INFINITY);
                b.total_cmp(&a)
            });
        }
        if let Some(k) = top_k.or(self.top_k) {
            joined.truncate(k);
        }
        joined
    }

    fn weights_for(&self, lists: usize) -> Vec<f64> {
        match &self.weights {
            Some(weights) => {
                if weights.len() != lists {
                    debug!(weights = weights.len(), lists, "weight count differs from list count");
                }
                weights.clone()
            }
            None => vec![1.0 / lists as f64; lists],
        }
    }

    fn merge(&self, lists: Vec<Vec<Document>>) -> Vec<Document> {
        let weights = self.weights_for(lists.len());
        let mut fused = Fused::default();
        for (docs, weight) in lists.into_iter().zip(weights) {
            for doc in docs {
                let score = doc.score.unwrap_or(0.0) * weight;
                fused.add(doc, score);
            }
        }
        fused.finish(1.0)
    }

    fn reciprocal_rank_fusion(&self, lists: Vec<Vec<Document>>) -> Vec<Document> {
        let n = lists.len() as f64;
        let weights = self.weights_for(lists.len());
        let mut fused = Fused::default();
        for (docs, weight) in lists.into_iter().zip(weights) {
            for (rank, doc) in docs.into_iter().enumerate() {
                fused.add(doc, weight * n / (RRF_K + rank as f64));
            }
        }
        // n / k is the best possible score: first in every list.
        fused.finish(n / RRF_K)
    }
}

fn concatenate(lists: Vec<Vec<Document>>) -> Vec<Document> {
    let mut best: Vec<Document> = Vec::new();
    let mut position: HashMap<DocumentId, usize> = HashMap::new();
    for doc in lists.into_iter().flatten() {
        match position.get(&doc.id) {
            Some(&i) => {
                let current = best[i].score.unwrap_or(f64::NEG_INFINITY);
                if doc.score.unwrap_or(f64::NEG_INFINITY) > current {
                    best[i] = doc;
                }
            }
            None => {
                position.insert(doc.id.clone(), best.len());
                best.push(doc);
            }
        }
    }
    best
}

/// Score accumulator keyed by document id, in first-appearance order.
#[derive(Default)]
struct Fused {
    order: Vec<DocumentId>,
    entries: HashMap<DocumentId, (Document, f64)>,
}

impl Fused {
    /// Add to a document's score; the latest copy of the document is kept.
    fn add(&mut self, doc: Document, score: f64) {
        match self.entries.get_mut(&doc.id) {
            Some((stored, total)) => {
                *total += score;
                *stored = doc;
            }
            None => {
                self.order.push(doc.id.clone());
                self.entries.insert(doc.id.clone(), (doc, score));
            }
        }
    }

    fn finish(mut self, divisor: f64) -> Vec<Document> {
        self.order
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .map(|(doc, score)| doc.with_score(score / divisor))
            .collect()
    }
}

impl Component for DocumentJoiner {
    fn inputs(&self) -> Vec<SocketSpec> {
        vec![
            SocketSpec::required("documents", ValueKind::Documents).variadic(),
            SocketSpec::optional("top_k", ValueKind::Count),
        ]
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        vec![SocketSpec::output("documents", ValueKind::Documents)]
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let mut lists = Vec::new();
        for value in inputs.take_all("documents") {
            match value {
                Value::Documents(docs) => lists.push(docs),
                other => {
                    return Err(RagPipeError::validation(format!(
                        "input 'documents' expects Documents, got {}",
                        other.kind()
                    )));
                }
            }
        }
        let top_k = inputs.take_optional_count("top_k")?;
        let lists_in = lists.len();
        let documents = self.join(lists, top_k);
        debug!(mode = ?self.mode, lists = lists_in, documents = documents.len(), "documents joined");
        Ok(SocketValues::new().with("documents", Value::Documents(documents)))
    }
}
