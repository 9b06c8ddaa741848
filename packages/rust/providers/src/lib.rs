//! Embedding and text generation backends.
//!
//! Every backend implements one of two traits:
//! - [`EmbeddingProvider`]: texts in, one dense vector per text out
//! - [`TextGenerator`]: prompt plus generation kwargs in, replies out
//!
//! Remote backends (Hugging Face Inference, OpenAI) use a blocking HTTP
//! client because pipeline components run synchronously. The offline
//! backends need no network or credentials.

mod http;
pub mod huggingface;
pub mod offline;
pub mod openai;

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use ragpipe_shared::{
    ApiKey, AppConfig, EmbeddingBackend, GeneratorBackend, Result, resolve_api_key,
};

pub use huggingface::{HuggingFaceEmbedder, HuggingFaceGenerator};
pub use offline::{EchoGenerator, HashingEmbedder};
pub use openai::{OpenAiEmbedder, OpenAiGenerator};

/// Free-form generation parameters (`max_new_tokens`, `temperature`, ...).
pub type GenerationKwargs = Map<String, Value>;

/// Turns texts into dense vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    /// Embed each text; the output has one vector per input, in order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Replies produced by a [`TextGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub replies: Vec<String>,
    /// Backend-specific details: model, finish reason, token usage.
    pub meta: Value,
}

/// Produces replies to a prompt.
pub trait TextGenerator: Send + Sync {
    fn model(&self) -> &str;

    fn generate(&self, prompt: &str, kwargs: &GenerationKwargs) -> Result<Generation>;
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Where remote backends get their API keys.
pub trait CredentialSource {
    /// Key for the service whose key lives in `env_var`; `label` names the
    /// service in prompts and errors.
    fn api_key(&self, env_var: &str, label: &str) -> Result<ApiKey>;
}

/// Environment first, then a hidden terminal prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvOrPrompt;

impl CredentialSource for EnvOrPrompt {
    fn api_key(&self, env_var: &str, label: &str) -> Result<ApiKey> {
        resolve_api_key(env_var, label)
    }
}

/// A single key handed to every backend.
#[derive(Debug, Clone)]
pub struct StaticKey(pub ApiKey);

impl CredentialSource for StaticKey {
    fn api_key(&self, _env_var: &str, _label: &str) -> Result<ApiKey> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// Construction from config
// ---------------------------------------------------------------------------

/// Build the configured embedding backend.
pub fn build_embedder(
    config: &AppConfig,
    credentials: &dyn CredentialSource,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.embedding.backend {
        EmbeddingBackend::HuggingFace => {
            let key = credentials.api_key(&config.hugging_face.api_key_env, "Hugging Face")?;
            Arc::new(HuggingFaceEmbedder::new(
                &config.hugging_face.base_url,
                &config.embedding.model,
                key,
                config.embedding.batch_size,
                &config.http,
            )?)
        }
        EmbeddingBackend::OpenAi => {
            let key = credentials.api_key(&config.openai.api_key_env, "OpenAI")?;
            Arc::new(OpenAiEmbedder::new(
                &config.openai.base_url,
                &config.openai.embedding_model,
                key,
                config.embedding.batch_size,
                &config.http,
            )?)
        }
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.embedding.dimensions)?),
    };
    info!(backend = ?config.embedding.backend, model = embedder.model(), "embedding backend ready");
    Ok(embedder)
}

/// Build a generation backend.
pub fn build_generator(
    backend: GeneratorBackend,
    config: &AppConfig,
    credentials: &dyn CredentialSource,
) -> Result<Box<dyn TextGenerator>> {
    let generator: Box<dyn TextGenerator> = match backend {
        GeneratorBackend::OpenAi => {
            let key = credentials.api_key(&config.openai.api_key_env, "OpenAI")?;
            Box::new(OpenAiGenerator::new(
                &config.openai.base_url,
                &config.openai.chat_model,
                key,
                &config.http,
            )?)
        }
        GeneratorBackend::HuggingFace => {
            let key = credentials.api_key(&config.hugging_face.api_key_env, "Hugging Face")?;
            Box::new(HuggingFaceGenerator::new(
                &config.hugging_face.base_url,
                &config.hugging_face.generation_model,
                key,
                &config.http,
            )?)
        }
        GeneratorBackend::Echo => Box::new(EchoGenerator),
    };
    info!(?backend, model = generator.model(), "generation backend ready");
    Ok(generator)
}
