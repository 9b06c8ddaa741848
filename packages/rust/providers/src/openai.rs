//! OpenAI API backends: `/embeddings` and `/chat/completions`.

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use ragpipe_shared::{ApiKey, HttpConfig, RagPipeError, Result};

use crate::http::{build_client, endpoint, post_json};
use crate::{EmbeddingProvider, Generation, GenerationKwargs, TextGenerator};

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Embeddings via `POST {base}/embeddings`.
pub struct OpenAiEmbedder {
    client: Client,
    url: Url,
    model: String,
    key: ApiKey,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        key: ApiKey,
        batch_size: usize,
        http: &HttpConfig,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(http)?,
            url: endpoint(base_url, "embeddings")?,
            model: model.to_string(),
            key,
            batch_size: batch_size.max(1),
        })
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, texts = texts.len()))]
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = json!({ "model": self.model, "input": batch });
            let mut response: EmbeddingResponse =
                post_json(&self.client, &self.url, &self.key, &body)?;
            if response.data.len() != batch.len() {
                return Err(RagPipeError::Provider(format!(
                    "embeddings endpoint returned {} vectors for {} inputs",
                    response.data.len(),
                    batch.len()
                )));
            }
            response.data.sort_by_key(|d| d.index);
            vectors.extend(response.data.into_iter().map(|d| d.embedding));
        }
        debug!(vectors = vectors.len(), "embedded texts");
        Ok(vectors)
    }
}

// ---------------------------------------------------------------------------
// Chat completions
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Value,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Single-turn generation via `POST {base}/chat/completions`.
pub struct OpenAiGenerator {
    client: Client,
    url: Url,
    model: String,
    key: ApiKey,
}

impl OpenAiGenerator {
    pub fn new(base_url: &str, model: &str, key: ApiKey, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(http)?,
            url: endpoint(base_url, "chat/completions")?,
            model: model.to_string(),
            key,
        })
    }
}

impl TextGenerator for OpenAiGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    fn generate(&self, prompt: &str, kwargs: &GenerationKwargs) -> Result<Generation> {
        let mut body = GenerationKwargs::new();
        body.insert("model".into(), Value::String(self.model.clone()));
        body.insert(
            "messages".into(),
            json!([{ "role": "user", "content": prompt }]),
        );
        for (key, value) in kwargs {
            // The chat API spells the token budget differently.
            let key = if key == "max_new_tokens" { "max_tokens" } else { key.as_str() };
            body.insert(key.to_string(), value.clone());
        }

        let response: ChatResponse = post_json(&self.client, &self.url, &self.key, &body)?;
        let finish_reasons: Vec<Value> = response
            .choices
            .iter()
            .map(|c| c.finish_reason.clone().map_or(Value::Null, Value::String))
            .collect();

        Ok(Generation {
            replies: response
                .choices
                .into_iter()
                .map(|c| c.message.content.unwrap_or_default())
                .collect(),
            meta: json!({
                "model": response.model.unwrap_or_else(|| self.model.clone()),
                "finish_reasons": finish_reasons,
                "usage": response.usage,
            }),
        })
    }
}
