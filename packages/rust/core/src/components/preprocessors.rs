//! Cleaning and splitting components.

use tracing::debug;

use ragpipe_convert::{CleanerSettings, SplitterSettings, clean_document, split_documents};
use ragpipe_shared::Result;

use crate::pipeline::{Component, SocketSpec, SocketValues, Value, ValueKind};

fn documents_in() -> Vec<SocketSpec> {
    vec![SocketSpec::required("documents", ValueKind::Documents)]
}

fn documents_out() -> Vec<SocketSpec> {
    vec![SocketSpec::output("documents", ValueKind::Documents)]
}

/// Runs the configured cleaning passes over each document.
#[derive(Debug, Clone, Default)]
pub struct DocumentCleaner {
    settings: CleanerSettings,
}

impl DocumentCleaner {
    pub fn new(settings: CleanerSettings) -> Self {
        Self { settings }
    }
}

impl Component for DocumentCleaner {
    fn inputs(&self) -> Vec<SocketSpec> {
        documents_in()
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        documents_out()
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let documents: Vec<_> = inputs
            .take_documents("documents")?
            .iter()
            .map(|doc| clean_document(doc, &self.settings))
            .collect();
        debug!(count = documents.len(), "documents cleaned");
        Ok(SocketValues::new().with("documents", Value::Documents(documents)))
    }
}

/// Cuts documents into overlapping windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentSplitter {
    settings: SplitterSettings,
}

impl DocumentSplitter {
    pub fn new(settings: SplitterSettings) -> Self {
        Self { settings }
    }
}

impl Component for DocumentSplitter {
    fn inputs(&self) -> Vec<SocketSpec> {
        documents_in()
    }

    fn outputs(&self) -> Vec<SocketSpec> {
        documents_out()
    }

    fn run(&self, mut inputs: SocketValues) -> Result<SocketValues> {
        let parents = inputs.take_documents("documents")?;
        let documents = split_documents(&parents, &self.settings);
        debug!(parents = parents.len(), splits = documents.len(), "documents split");
        Ok(SocketValues::new().with("documents", Value::Documents(documents)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragpipe_convert::SplitBy;
    use ragpipe_shared::Document;
    use serde_json::json;

    #[test]
    fn cleaner_drops_empty_lines_and_runs_of_spaces() {
        let docs = vec![Document::new("Preheat   the oven.\n\n\nServe   warm.").with_score(0.5)];
        let mut out = DocumentCleaner::default()
            .run(SocketValues::new().with("documents", Value::Documents(docs)))
            .unwrap();
        let cleaned = out.take_documents("documents").unwrap();
        assert_eq!(cleaned[0].content, "Preheat the oven.\nServe warm.");
        assert_eq!(cleaned[0].score, Some(0.5));
    }

    #[test]
    fn splitter_windows_overlap() {
        let settings = SplitterSettings::new(SplitBy::Word, 3, 1).unwrap();
        let docs = vec![Document::new("one two three four five")];
        let mut out = DocumentSplitter::new(settings)
            .run(SocketValues::new().with("documents", Value::Documents(docs)))
            .unwrap();
        let splits = out.take_documents("documents").unwrap();
        let contents: Vec<_> = splits.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["one two three ", "three four five"]);
        assert_eq!(splits[1].meta_value("split_id"), Some(&json!(1)));
    }
}
