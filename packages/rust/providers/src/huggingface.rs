//! Hugging Face Inference API backends.
//!
//! - feature extraction: `POST {base}/models/{model}/pipeline/feature-extraction`
//! - text generation: `POST {base}/models/{model}`

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use ragpipe_shared::{ApiKey, HttpConfig, RagPipeError, Result};

use crate::http::{build_client, endpoint, post_json};
use crate::{EmbeddingProvider, Generation, GenerationKwargs, TextGenerator};

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

/// Sentence embeddings from the feature-extraction pipeline.
pub struct HuggingFaceEmbedder {
    client: Client,
    url: Url,
    model: String,
    key: ApiKey,
    batch_size: usize,
}

impl HuggingFaceEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        key: ApiKey,
        batch_size: usize,
        http: &HttpConfig,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(http)?,
            url: endpoint(base_url, &format!("models/{model}/pipeline/feature-extraction"))?,
            model: model.to_string(),
            key,
            batch_size: batch_size.max(1),
        })
    }
}

impl EmbeddingProvider for HuggingFaceEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, texts = texts.len()))]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = json!({ "inputs": batch });
            let response: Value = post_json(&self.client, &self.url, &self.key, &body)?;
            let embedded = pooled_embeddings(response)?;
            if embedded.len() != batch.len() {
                return Err(RagPipeError::Provider(format!(
                    "feature extraction returned {} vectors for {} inputs",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }
        debug!(vectors = vectors.len(), "embedded texts");
        Ok(vectors)
    }
}

/// Accept `[[f32]]` (pooled) or `[[[f32]]]` (per token, mean-pooled here).
fn pooled_embeddings(response: Value) -> Result<Vec<Vec<f32>>> {
    if let Ok(pooled) = serde_json::from_value::<Vec<Vec<f32>>>(response.clone()) {
        return Ok(pooled);
    }
    let per_token: Vec<Vec<Vec<f32>>> = serde_json::from_value(response)
        .map_err(|e| RagPipeError::Provider(format!("unexpected feature-extraction shape: {e}")))?;

    per_token
        .into_iter()
        .map(|tokens| {
            let width = tokens.first().map(Vec::len).ok_or_else(|| {
                RagPipeError::Provider("feature extraction returned no tokens".into())
            })?;
            let mut mean = vec![0.0f32; width];
            for token in &tokens {
                for (acc, v) in mean.iter_mut().zip(token) {
                    *acc += v;
                }
            }
            let n = tokens.len() as f32;
            mean.iter_mut().for_each(|v| *v /= n);
            Ok(mean)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Text generation through the serverless Inference API.
pub struct HuggingFaceGenerator {
    client: Client,
    url: Url,
    model: String,
    key: ApiKey,
}

#[derive(Deserialize)]
struct GeneratedText {
    generated_text: String,
}

impl HuggingFaceGenerator {
    pub fn new(base_url: &str, model: &str, key: ApiKey, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(http)?,
            url: endpoint(base_url, &format!("models/{model}"))?,
            model: model.to_string(),
            key,
        })
    }
}

impl TextGenerator for HuggingFaceGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    fn generate(&self, prompt: &str, kwargs: &GenerationKwargs) -> Result<Generation> {
        let mut parameters = GenerationKwargs::new();
        parameters.insert("return_full_text".into(), Value::Bool(false));
        parameters.extend(kwargs.iter().map(|(k, v)| (k.clone(), v.clone())));

        let body = json!({ "inputs": prompt, "parameters": parameters });
        let outputs: Vec<GeneratedText> = post_json(&self.client, &self.url, &self.key, &body)?;

        Ok(Generation {
            replies: outputs.into_iter().map(|o| o.generated_text).collect(),
            meta: json!({ "model": self.model }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> HttpConfig {
        HttpConfig { timeout_secs: 5 }
    }

    #[test]
    fn token_embeddings_are_mean_pooled() {
        let pooled = pooled_embeddings(json!([[[1.0, 2.0], [3.0, 4.0]]])).expect("pool");
        assert_eq!(pooled, vec![vec![2.0, 3.0]]);
        assert!(pooled_embeddings(json!({"error": "loading"})).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn embeds_in_batches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/org/mini/pipeline/feature-extraction"))
            .and(header("authorization", "Bearer hf-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([[0.5, 0.5], [1.0, 0.0]])))
            .expect(2)
            .mount(&server)
            .await;

        let base = server.uri();
        let vectors = tokio::task::spawn_blocking(move || {
            let embedder =
                HuggingFaceEmbedder::new(&base, "org/mini", ApiKey::new("hf-test"), 2, &http())?;
            let texts: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
            embedder.embed(&texts)
        })
        .await
        .expect("join")
        .expect("embed");

        assert_eq!(vectors.len(), 4);
        assert_eq!(vectors[3], vec![1.0, 0.0]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn generation_sends_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/HuggingFaceH4/zephyr-7b-beta"))
            .and(body_partial_json(json!({
                "inputs": "Question: why?\nAnswer:",
                "parameters": {"max_new_tokens": 350, "return_full_text": false}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"generated_text": "Because bacon."}])),
            )
            .mount(&server)
            .await;

        let base = server.uri();
        let generation = tokio::task::spawn_blocking(move || {
            let generator = HuggingFaceGenerator::new(
                &base,
                "HuggingFaceH4/zephyr-7b-beta",
                ApiKey::new("hf-test"),
                &http(),
            )?;
            let kwargs = json!({"max_new_tokens": 350}).as_object().cloned().unwrap_or_default();
            generator.generate("Question: why?\nAnswer:", &kwargs)
        })
        .await
        .expect("join")
        .expect("generate");

        assert_eq!(generation.replies, vec!["Because bacon.".to_string()]);
        assert_eq!(generation.meta["model"], "HuggingFaceH4/zephyr-7b-beta");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_errors_become_provider_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model is loading"))
            .mount(&server)
            .await;

        let base = server.uri();
        let err = tokio::task::spawn_blocking(move || {
            let generator = HuggingFaceGenerator::new(&base, "m", ApiKey::new("k"), &http())?;
            generator.generate("hi", &GenerationKwargs::new())
        })
        .await
        .expect("join")
        .unwrap_err();

        assert!(matches!(err, RagPipeError::Provider(_)));
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("model is loading"));
    }
}
