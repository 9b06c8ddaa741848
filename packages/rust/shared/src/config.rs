//! Application configuration for ragpipe.
//!
//! User config lives at `~/.ragpipe/ragpipe.toml`.
//! CLI flags override config file values, which override defaults.
//! Credentials are never stored here: each provider section names the
//! environment variable that holds its key.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RagPipeError, Result};
use crate::types::ApiKey;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ragpipe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ragpipe";

// ---------------------------------------------------------------------------
// Config structs (matching ragpipe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Embedding backend selection.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Generation backend selection.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// OpenAI API settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Hugging Face Inference API settings.
    #[serde(default)]
    pub hugging_face: HuggingFaceConfig,

    /// Document splitting.
    #[serde(default)]
    pub splitter: SplitterConfig,

    /// Keyword retrieval scoring.
    #[serde(default)]
    pub bm25: Bm25Config,

    /// HTTP client behaviour shared by all providers.
    #[serde(default)]
    pub http: HttpConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// CSV dataset used by the expenses workflow.
    #[serde(default = "default_expenses_csv")]
    pub expenses_csv: String,

    /// Folder ingested by the multi-format workflow.
    #[serde(default = "default_ingest_dir")]
    pub ingest_dir: String,

    /// Number of documents a retriever returns.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            expenses_csv: default_expenses_csv(),
            ingest_dir: default_ingest_dir(),
            top_k: default_top_k(),
        }
    }
}

fn default_expenses_csv() -> String {
    "dataset/expenses.csv".into()
}
fn default_ingest_dir() -> String {
    "dataset/recipe_files".into()
}
fn default_top_k() -> usize {
    10
}

/// Which service turns text into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// Hugging Face Inference feature-extraction endpoint.
    HuggingFace,
    /// OpenAI embeddings endpoint.
    #[serde(rename = "openai")]
    OpenAi,
    /// Offline feature hashing; no network, no credentials.
    Hashing,
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend used for both document and query embeddings.
    #[serde(default = "default_embedding_backend")]
    pub backend: EmbeddingBackend,

    /// Model id for the Hugging Face backend.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Number of texts sent per request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Vector width of the hashing backend.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Retrieval similarity: `dot_product` or `cosine`.
    #[serde(default = "default_similarity")]
    pub similarity: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            dimensions: default_dimensions(),
            similarity: default_similarity(),
        }
    }
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::HuggingFace
}
fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".into()
}
fn default_batch_size() -> usize {
    32
}
fn default_dimensions() -> usize {
    384
}
fn default_similarity() -> String {
    "dot_product".into()
}

/// Which service produces replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeneratorBackend {
    /// OpenAI chat completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// Hugging Face text generation.
    HuggingFace,
    /// Offline echo of the prompt's last line.
    Echo,
}

/// `[generator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Backend for the expenses Q&A workflow.
    #[serde(default = "default_qa_backend")]
    pub qa_backend: GeneratorBackend,

    /// Backend for the multi-format ingest workflow.
    #[serde(default = "default_ingest_backend")]
    pub ingest_backend: GeneratorBackend,

    /// Token budget passed as `max_new_tokens` / `max_tokens`.
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            qa_backend: default_qa_backend(),
            ingest_backend: default_ingest_backend(),
            max_new_tokens: default_max_new_tokens(),
        }
    }
}

fn default_qa_backend() -> GeneratorBackend {
    GeneratorBackend::OpenAi
}
fn default_ingest_backend() -> GeneratorBackend {
    GeneratorBackend::HuggingFace
}
fn default_max_new_tokens() -> u32 {
    350
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// API root, without a trailing slash.
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Chat model used for generation.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model used when `[embedding] backend = "openai"`.
    #[serde(default = "default_openai_embedding_model")]
    pub embedding_model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_key_env(),
            base_url: default_openai_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_openai_embedding_model(),
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_chat_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_openai_embedding_model() -> String {
    "text-embedding-3-small".into()
}

/// `[hugging_face]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuggingFaceConfig {
    /// Name of the env var holding the access token.
    #[serde(default = "default_hf_key_env")]
    pub api_key_env: String,

    /// Inference API root, without a trailing slash.
    #[serde(default = "default_hf_base_url")]
    pub base_url: String,

    /// Text-generation model.
    #[serde(default = "default_generation_model")]
    pub generation_model: String,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_hf_key_env(),
            base_url: default_hf_base_url(),
            generation_model: default_generation_model(),
        }
    }
}

fn default_hf_key_env() -> String {
    "HF_API_TOKEN".into()
}
fn default_hf_base_url() -> String {
    "https://router.huggingface.co/hf-inference".into()
}
fn default_generation_model() -> String {
    "HuggingFaceH4/zephyr-7b-beta".into()
}

/// `[splitter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Unit of splitting: `word`, `sentence`, `passage`, or `page`.
    #[serde(default = "default_split_by")]
    pub split_by: String,

    /// Units per chunk.
    #[serde(default = "default_split_length")]
    pub split_length: usize,

    /// Units shared between consecutive chunks.
    #[serde(default = "default_split_overlap")]
    pub split_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            split_by: default_split_by(),
            split_length: default_split_length(),
            split_overlap: default_split_overlap(),
        }
    }
}

fn default_split_by() -> String {
    "word".into()
}
fn default_split_length() -> usize {
    150
}
fn default_split_overlap() -> usize {
    50
}

/// `[bm25]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Config {
    /// `BM25Okapi`, `BM25L`, or `BM25Plus`.
    #[serde(default = "default_bm25_algorithm")]
    pub algorithm: String,

    /// Term-frequency saturation.
    #[serde(default = "default_k1")]
    pub k1: f64,

    /// Length normalisation.
    #[serde(default = "default_b")]
    pub b: f64,

    /// Lower-bound shift for BM25L / BM25Plus. Algorithm default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            algorithm: default_bm25_algorithm(),
            k1: default_k1(),
            b: default_b(),
            delta: None,
        }
    }
}

fn default_bm25_algorithm() -> String {
    "BM25L".into()
}
fn default_k1() -> f64 {
    1.5
}
fn default_b() -> f64 {
    0.75
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout for provider calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ragpipe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| RagPipeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ragpipe/ragpipe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RagPipeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RagPipeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| RagPipeError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RagPipeError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| RagPipeError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Read a non-empty API key from the named environment variable.
pub fn validate_api_key(var_name: &str) -> Result<ApiKey> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(ApiKey::new(val)),
        _ => Err(RagPipeError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Resolve an API key from the environment, prompting without echo when it
/// is absent and stdin is a terminal.
///
/// The key is returned to the caller for explicit injection into a provider;
/// the process environment is left untouched.
pub fn resolve_api_key(var_name: &str, label: &str) -> Result<ApiKey> {
    if let Ok(key) = validate_api_key(var_name) {
        return Ok(key);
    }

    if !std::io::stdin().is_terminal() {
        return Err(RagPipeError::config(format!(
            "{label} not found in {var_name} and stdin is not a terminal"
        )));
    }

    tracing::debug!(var_name, "credential not in environment, prompting");
    let secret = rpassword::prompt_password(format!("Enter {label}: "))
        .map_err(|e| RagPipeError::config(format!("failed to read {label}: {e}")))?;

    let key = ApiKey::new(secret.trim());
    if key.is_empty() {
        return Err(RagPipeError::config(format!("{label} must not be empty")));
    }
    Ok(key)
}
