//! Core domain types: documents and credentials.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Document metadata: an insertion-ordered map of key to JSON scalar.
pub type Meta = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// DocumentId
// ---------------------------------------------------------------------------

/// Content-derived document identifier (hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Derive the id of a document from its content and metadata.
    pub fn derive(content: &str, meta: &Meta) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hasher.update([0u8]);
        // Serializing a JSON map cannot fail.
        hasher.update(serde_json::to_vec(meta).unwrap_or_default());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Unit of content plus metadata circulated through a pipeline.
///
/// The id is derived from content and metadata at construction time.
/// Attaching an embedding or a retrieval score never changes either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier (content hash unless set explicitly).
    pub id: DocumentId,
    /// Text content.
    pub content: String,
    /// Free-form scalar metadata (`date`, `version`, `file_path`, ...).
    #[serde(default)]
    pub meta: Meta,
    /// Dense vector attached by an embedder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Relevance score attached by a retriever or joiner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self::with_meta(content, Meta::new())
    }

    /// Create a document with metadata; the id is derived from both.
    pub fn with_meta(content: impl Into<String>, meta: Meta) -> Self {
        let content = content.into();
        let id = DocumentId::derive(&content, &meta);
        Self {
            id,
            content,
            meta,
            embedding: None,
            score: None,
        }
    }

    /// Replace the derived id with an explicit one.
    pub fn with_id(mut self, id: impl Into<DocumentId>) -> Self {
        self.id = id.into();
        self
    }

    /// Return a copy carrying the given embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Return a copy carrying the given relevance score.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Look up a metadata value by key.
    pub fn meta_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.meta.get(key)
    }
}

// ---------------------------------------------------------------------------
// ApiKey
// ---------------------------------------------------------------------------

/// A provider credential, handed explicitly to the client that needs it.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for building an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}
