//! Pipeline components wrapping the store, converters, and providers.
//!
//! | Component | Inputs | Outputs |
//! |---|---|---|
//! | [`TextEmbedder`] | `text` | `embedding` |
//! | [`DocumentEmbedder`] | `documents` | `documents` |
//! | [`EmbeddingRetriever`] | `query_embedding`, `filters?`, `top_k?` | `documents` |
//! | [`Bm25Retriever`] | `query`, `filters?`, `top_k?` | `documents` |
//! | [`PromptBuilder`] | one socket per template variable | `prompt` |
//! | [`Generator`] | `prompt`, `generation_kwargs?` | `replies`, `meta` |
//! | [`FileTypeRouter`] | `sources` | one per MIME type, `unclassified` |
//! | [`FileConverter`] | `sources`, `meta?` | `documents` |
//! | [`DocumentJoiner`] | `documents` (variadic), `top_k?` | `documents` |
//! | [`DocumentCleaner`] | `documents` | `documents` |
//! | [`DocumentSplitter`] | `documents` | `documents` |
//! | [`DocumentWriter`] | `documents`, `policy?` | `documents_written` |

pub mod builders;
pub mod converters;
pub mod embedders;
pub mod generators;
pub mod joiners;
pub mod preprocessors;
pub mod retrievers;
pub mod writers;

pub use builders::PromptBuilder;
pub use converters::{FileConverter, FileTypeRouter, UNCLASSIFIED};
pub use embedders::{DocumentEmbedder, TextEmbedder};
pub use generators::Generator;
pub use joiners::{DocumentJoiner, JoinMode};
pub use preprocessors::{DocumentCleaner, DocumentSplitter};
pub use retrievers::{Bm25Retriever, EmbeddingRetriever};
pub use writers::DocumentWriter;
