//! BM25 keyword scoring (Okapi, L, and Plus variants).
//!
//! Corpus statistics are maintained incrementally by the store as
//! documents are written and deleted.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use ragpipe_shared::{Bm25Config, RagPipeError, Result};

/// Scaling factor applied before the sigmoid when scores are normalised.
pub(crate) const BM25_SCALING_FACTOR: f64 = 8.0;

/// BM25 family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bm25Algorithm {
    Okapi,
    L,
    Plus,
}

impl FromStr for Bm25Algorithm {
    type Err = RagPipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bm25okapi" | "okapi" => Ok(Self::Okapi),
            "bm25l" | "l" => Ok(Self::L),
            "bm25plus" | "plus" => Ok(Self::Plus),
            _ => Err(RagPipeError::config(format!(
                "unknown BM25 algorithm '{s}': expected BM25Okapi, BM25L, or BM25Plus"
            ))),
        }
    }
}

/// Scoring parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub algorithm: Bm25Algorithm,
    pub k1: f64,
    pub b: f64,
    pub delta: f64,
    /// Okapi only: floor for negative IDF as a fraction of the mean IDF.
    pub epsilon: f64,
}

impl Bm25Params {
    /// Textbook defaults for the given algorithm.
    pub fn new(algorithm: Bm25Algorithm) -> Self {
        let delta = match algorithm {
            Bm25Algorithm::Okapi => 0.0,
            Bm25Algorithm::L => 0.5,
            Bm25Algorithm::Plus => 1.0,
        };
        Self {
            algorithm,
            k1: 1.5,
            b: 0.75,
            delta,
            epsilon: 0.25,
        }
    }
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self::new(Bm25Algorithm::L)
    }
}

impl TryFrom<&Bm25Config> for Bm25Params {
    type Error = RagPipeError;

    fn try_from(config: &Bm25Config) -> Result<Self> {
        let mut params = Self::new(config.algorithm.parse()?);
        params.k1 = config.k1;
        params.b = config.b;
        if let Some(delta) = config.delta {
            params.delta = delta;
        }
        Ok(params)
    }
}

/// Lower-cased word tokens of two or more characters.
pub fn tokenize(text: &str) -> Vec<String> {
    static TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("valid regex"));

    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Per-document term statistics.
#[derive(Debug, Clone, Default)]
pub(crate) struct DocStats {
    pub term_freq: HashMap<String, usize>,
    pub len: usize,
}

impl DocStats {
    pub fn from_text(text: &str) -> Self {
        let tokens = tokenize(text);
        let len = tokens.len();
        let mut term_freq = HashMap::new();
        for token in tokens {
            *term_freq.entry(token).or_insert(0) += 1;
        }
        Self { term_freq, len }
    }
}

/// Corpus-wide statistics: document frequency per term and total length.
#[derive(Debug, Clone, Default)]
pub(crate) struct CorpusStats {
    doc_freq: HashMap<String, usize>,
    total_len: usize,
    doc_count: usize,
}

impl CorpusStats {
    pub fn add(&mut self, doc: &DocStats) {
        for term in doc.term_freq.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }
        self.total_len += doc.len;
        self.doc_count += 1;
    }

    pub fn remove(&mut self, doc: &DocStats) {
        for term in doc.term_freq.keys() {
            if let Some(n) = self.doc_freq.get_mut(term) {
                *n -= 1;
                if *n == 0 {
                    self.doc_freq.remove(term);
                }
            }
        }
        self.total_len -= doc.len;
        self.doc_count -= 1;
    }

    fn avg_len(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_len as f64 / self.doc_count as f64
        }
    }

    /// Compute IDF for each query term under the given algorithm.
    pub fn idf(&self, params: &Bm25Params, query: &[String]) -> HashMap<String, f64> {
        let n_corpus = self.doc_count as f64;
        let mut idf: HashMap<String, f64> = query
            .iter()
            .map(|term| {
                let n = self.doc_freq.get(term).copied().unwrap_or(0);
                let value = if n == 0 {
                    0.0
                } else {
                    let n = n as f64;
                    match params.algorithm {
                        Bm25Algorithm::Okapi => ((n_corpus - n + 0.5) / (n + 0.5)).ln(),
                        Bm25Algorithm::L => ((n_corpus + 1.0) / (n + 0.5)).ln(),
                        Bm25Algorithm::Plus => (1.0 + (n_corpus - n + 0.5) / (n + 0.5)).ln(),
                    }
                };
                (term.clone(), value)
            })
            .collect();

        if params.algorithm == Bm25Algorithm::Okapi && !idf.is_empty() {
            let mean = idf.values().sum::<f64>() / idf.len() as f64;
            let floor = params.epsilon * mean;
            for (term, value) in idf.iter_mut() {
                if *value < 0.0 && self.doc_freq.contains_key(term) {
                    *value = floor;
                }
            }
        }
        idf
    }

    /// Score one document against the (already tokenised) query.
    pub fn score(
        &self,
        params: &Bm25Params,
        idf: &HashMap<String, f64>,
        query: &[String],
        doc: &DocStats,
    ) -> f64 {
        let avg_len = self.avg_len();
        if avg_len == 0.0 {
            return 0.0;
        }
        let (k, b, delta) = (params.k1, params.b, params.delta);
        let len_ratio = doc.len as f64 / avg_len;

        query
            .iter()
            .map(|term| {
                let freq = doc.term_freq.get(term).copied().unwrap_or(0) as f64;
                let tf = match params.algorithm {
                    Bm25Algorithm::Okapi => {
                        freq * (k + 1.0) / (freq + k * (1.0 - b + b * len_ratio))
                    }
                    Bm25Algorithm::L => {
                        let ctd = freq / (1.0 - b + b * len_ratio);
                        (1.0 + k) * (ctd + delta) / (k + ctd + delta)
                    }
                    Bm25Algorithm::Plus => {
                        freq * (1.0 + k) / (freq + k * (1.0 - b + b * len_ratio)) + delta
                    }
                };
                idf.get(term).copied().unwrap_or(0.0) * tf
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(texts: &[&str]) -> (CorpusStats, Vec<DocStats>) {
        let docs: Vec<DocStats> = texts.iter().map(|t| DocStats::from_text(t)).collect();
        let mut stats = CorpusStats::default();
        for d in &docs {
            stats.add(d);
        }
        (stats, docs)
    }

    #[test]
    fn tokenize_lowercases_and_drops_single_chars() {
        assert_eq!(
            tokenize("Haystack's farm-haystack[inference] a 2.0"),
            vec!["haystack", "farm", "haystack", "inference"]
        );
    }

    #[test]
    fn algorithm_parsing() {
        assert_eq!("BM25Plus".parse::<Bm25Algorithm>().unwrap(), Bm25Algorithm::Plus);
        assert_eq!("bm25l".parse::<Bm25Algorithm>().unwrap(), Bm25Algorithm::L);
        assert!("tfidf".parse::<Bm25Algorithm>().is_err());
        assert_eq!(Bm25Params::new(Bm25Algorithm::L).delta, 0.5);
    }

    #[test]
    fn params_from_config_override_delta() {
        let config = Bm25Config {
            algorithm: "BM25Plus".into(),
            k1: 1.2,
            b: 0.5,
            delta: Some(0.7),
        };
        let params = Bm25Params::try_from(&config).expect("params");
        assert_eq!(params.algorithm, Bm25Algorithm::Plus);
        assert_eq!(params.delta, 0.7);
        assert_eq!(params.k1, 1.2);
    }

    #[test]
    fn matching_document_scores_highest() {
        for algorithm in [Bm25Algorithm::Okapi, Bm25Algorithm::L, Bm25Algorithm::Plus] {
            let params = Bm25Params::new(algorithm);
            let (stats, docs) = corpus(&[
                "rust borrow checker explained",
                "gardening tips for spring",
                "python packaging guide",
                "cooking pasta at home",
            ]);
            let query = tokenize("borrow checker");
            let idf = stats.idf(&params, &query);
            let scores: Vec<f64> = docs.iter().map(|d| stats.score(&params, &idf, &query, d)).collect();
            assert!(scores[0] > 0.0, "{algorithm:?}");
            assert!(scores[0] > scores[1], "{algorithm:?}");
        }
    }

    #[test]
    fn unknown_terms_score_zero() {
        let params = Bm25Params::new(Bm25Algorithm::Plus);
        let (stats, docs) = corpus(&["alpha beta", "gamma delta"]);
        let query = tokenize("omega");
        let idf = stats.idf(&params, &query);
        assert_eq!(stats.score(&params, &idf, &query, &docs[0]), 0.0);
    }

    #[test]
    fn remove_restores_statistics() {
        let (mut stats, docs) = corpus(&["alpha beta", "alpha gamma"]);
        stats.remove(&docs[1]);
        assert_eq!(stats.doc_count, 1);
        assert_eq!(stats.doc_freq.get("alpha"), Some(&1));
        assert!(!stats.doc_freq.contains_key("gamma"));
    }
}
