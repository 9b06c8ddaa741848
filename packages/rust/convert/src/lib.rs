//! Turning files into documents and preparing documents for indexing.
//!
//! - [`SourceFormat`]: text, Markdown, PDF, and HTML converters
//! - [`route_by_mime`] / [`list_files`]: MIME classification of folder contents
//! - [`load_csv_documents`]: one document per CSV row
//! - [`clean_document`] and [`split_document`]: cleaning and overlapping splits

mod cleanup;
pub mod cleaner;
pub mod converters;
pub mod html;
pub mod markdown;
pub mod mime;
pub mod rows;
pub mod splitter;

pub use cleaner::{CleanerSettings, clean_document};
pub use converters::{PAGE_BREAK, SourceFormat};
pub use html::html_to_markdown;
pub use markdown::markdown_to_text;
pub use mime::{MimeRoutes, guess_mime, list_files, route_by_mime};
pub use rows::{DATE_COLUMN, csv_documents, load_csv_documents};
pub use splitter::{SplitBy, SplitterSettings, split_document, split_documents};
