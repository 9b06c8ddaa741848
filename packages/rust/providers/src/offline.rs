//! Backends that run without network access or credentials.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use sha2::{Digest, Sha256};

use ragpipe_shared::{RagPipeError, Result};

use crate::{EmbeddingProvider, Generation, GenerationKwargs, TextGenerator};

/// Feature-hashed bag of words, L2-normalised.
///
/// Each lower-cased token is hashed to a bucket and a sign, so texts that
/// share vocabulary land close together under dot product.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    model: String,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagPipeError::validation("hashing dimensions must be > 0"));
        }
        Ok(Self {
            dimensions,
            model: format!("hashing-{dimensions}"),
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        static WORD_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\w+").expect("valid regex"));

        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for token in WORD_RE.find_iter(&lowered) {
            let digest = Sha256::digest(token.as_str().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Replies with the last non-empty line of the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

impl TextGenerator for EchoGenerator {
    fn model(&self) -> &str {
        "echo"
    }

    fn generate(&self, prompt: &str, _kwargs: &GenerationKwargs) -> Result<Generation> {
        let reply = prompt
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();
        Ok(Generation {
            replies: vec![reply],
            meta: json!({ "model": "echo" }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn vectors_are_normalised_and_deterministic() {
        let embedder = HashingEmbedder::new(64).expect("embedder");
        let v = embedder.embed(&["Rent paid in March".into()]).expect("embed");
        let norm = dot(&v[0], &v[0]).sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(v, embedder.embed(&["rent PAID in march".into()]).expect("embed"));
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let embedder = HashingEmbedder::new(384).expect("embedder");
        let texts = vec![
            "groceries at the market".to_string(),
            "monthly rent payment".to_string(),
            "rent".to_string(),
        ];
        let v = embedder.embed(&texts).expect("embed");
        assert!(dot(&v[2], &v[1]) > dot(&v[2], &v[0]));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8).expect("embedder");
        assert_eq!(embedder.embed(&[String::new()]).expect("embed")[0], vec![0.0; 8]);
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[test]
    fn echo_replies_with_last_line() {
        let generation = EchoGenerator
            .generate("Context:\n  a\n\nQuestion: why?\n   \n", &GenerationKwargs::new())
            .expect("generate");
        assert_eq!(generation.replies, vec!["Question: why?".to_string()]);
    }
}
