//! Shared types, error model, and configuration for ragpipe.
//!
//! This crate is the foundation depended on by all other ragpipe crates.
//! It provides:
//! - [`RagPipeError`], the unified error type for capability providers
//! - Domain types ([`Document`], [`DocumentId`], [`ApiKey`])
//! - Configuration ([`AppConfig`], runtime settings, config loading, credentials)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, Bm25Config, DefaultsConfig, EmbeddingBackend, EmbeddingConfig, GeneratorBackend,
    GeneratorConfig, HttpConfig, HuggingFaceConfig, OpenAiConfig, SplitterConfig, config_dir,
    config_file_path, init_config, init_config_at, load_config, load_config_from,
    resolve_api_key, validate_api_key,
};
pub use error::{RagPipeError, Result};
pub use types::{ApiKey, Document, DocumentId, Meta};
