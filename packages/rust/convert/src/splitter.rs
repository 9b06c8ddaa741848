//! Overlapping window splitter.
//!
//! Text is cut into units (words, sentences, passages, or pages) that keep
//! their trailing delimiter, so joining consecutive units reproduces the
//! original text exactly. Windows of `split_length` units advance by
//! `split_length - split_overlap`.

use std::str::FromStr;

use serde_json::Value;

use ragpipe_shared::{Document, RagPipeError, Result, SplitterConfig};

use crate::converters::PAGE_BREAK;

/// Unit a document is split on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitBy {
    /// Space-separated words.
    Word,
    /// Text ending in a period.
    Sentence,
    /// Blank-line separated blocks.
    Passage,
    /// Form-feed separated pages.
    Page,
}

impl SplitBy {
    fn delimiter(self) -> &'static str {
        match self {
            Self::Word => " ",
            Self::Sentence => ".",
            Self::Passage => "\n\n",
            Self::Page => "\u{c}",
        }
    }
}

impl FromStr for SplitBy {
    type Err = RagPipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "word" => Ok(Self::Word),
            "sentence" => Ok(Self::Sentence),
            "passage" => Ok(Self::Passage),
            "page" => Ok(Self::Page),
            _ => Err(RagPipeError::validation(format!(
                "unknown split_by '{s}': expected word, sentence, passage, or page"
            ))),
        }
    }
}

/// Validated splitter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterSettings {
    split_by: SplitBy,
    split_length: usize,
    split_overlap: usize,
}

impl SplitterSettings {
    pub fn new(split_by: SplitBy, split_length: usize, split_overlap: usize) -> Result<Self> {
        if split_length == 0 {
            return Err(RagPipeError::validation("split_length must be greater than 0"));
        }
        if split_overlap >= split_length {
            return Err(RagPipeError::validation(format!(
                "split_overlap ({split_overlap}) must be smaller than split_length ({split_length})"
            )));
        }
        Ok(Self {
            split_by,
            split_length,
            split_overlap,
        })
    }

    pub fn split_by(&self) -> SplitBy {
        self.split_by
    }

    pub fn split_length(&self) -> usize {
        self.split_length
    }

    pub fn split_overlap(&self) -> usize {
        self.split_overlap
    }
}

impl Default for SplitterSettings {
    fn default() -> Self {
        Self {
            split_by: SplitBy::Word,
            split_length: 150,
            split_overlap: 50,
        }
    }
}

impl TryFrom<&SplitterConfig> for SplitterSettings {
    type Error = RagPipeError;

    fn try_from(config: &SplitterConfig) -> Result<Self> {
        Self::new(
            config.split_by.parse()?,
            config.split_length,
            config.split_overlap,
        )
    }
}

/// One window of text and where it starts.
#[derive(Debug, Clone, PartialEq)]
struct Chunk {
    text: String,
    page_number: usize,
    start: usize,
}

/// Split one document into overlapping chunks.
///
/// Each chunk copies the parent metadata and adds `source_id`,
/// `page_number`, `split_id`, and `split_idx_start` (a character offset
/// into the parent content).
pub fn split_document(doc: &Document, settings: &SplitterSettings) -> Vec<Document> {
    let units: Vec<&str> = doc
        .content
        .split_inclusive(settings.split_by.delimiter())
        .collect();

    windows(&units, settings)
        .into_iter()
        .enumerate()
        .map(|(split_id, chunk)| {
            let mut meta = doc.meta.clone();
            meta.insert("source_id".into(), Value::String(doc.id.to_string()));
            meta.insert("page_number".into(), Value::from(chunk.page_number));
            meta.insert("split_id".into(), Value::from(split_id));
            meta.insert("split_idx_start".into(), Value::from(chunk.start));
            Document::with_meta(chunk.text, meta)
        })
        .collect()
}

/// Split every document; documents with empty content yield nothing.
pub fn split_documents(docs: &[Document], settings: &SplitterSettings) -> Vec<Document> {
    docs.iter()
        .flat_map(|doc| split_document(doc, settings))
        .collect()
}

fn windows(units: &[&str], settings: &SplitterSettings) -> Vec<Chunk> {
    let step = settings.split_length - settings.split_overlap;
    let mut chunks = Vec::new();
    let mut page_number = 1;
    let mut start = 0;
    let mut offset = 0;

    loop {
        let end = (offset + settings.split_length).min(units.len());
        let window = &units[offset.min(end)..end];
        let text = window.concat();
        if !text.is_empty() {
            chunks.push(Chunk {
                text,
                page_number,
                start,
            });
        }
        if offset + settings.split_length >= units.len() {
            break;
        }

        let advanced = &window[..step.min(window.len())];
        start += advanced.iter().map(|u| u.chars().count()).sum::<usize>();
        page_number += match settings.split_by {
            SplitBy::Page => advanced.len(),
            _ => advanced
                .iter()
                .map(|u| u.matches(PAGE_BREAK).count())
                .sum(),
        };
        offset += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.content.as_str()).collect()
    }

    #[test]
    fn overlap_must_be_smaller_than_length() {
        assert!(SplitterSettings::new(SplitBy::Word, 3, 3).is_err());
        assert!(SplitterSettings::new(SplitBy::Word, 0, 0).is_err());
        assert!(SplitterSettings::new(SplitBy::Word, 3, 2).is_ok());
    }

    #[test]
    fn word_windows_overlap() {
        let settings = SplitterSettings::new(SplitBy::Word, 3, 1).expect("settings");
        let doc = Document::new("a b c d e f");
        let splits = split_document(&doc, &settings);
        assert_eq!(texts(&splits), vec!["a b c ", "c d e ", "e f"]);

        let starts: Vec<_> = splits.iter().map(|d| d.meta["split_idx_start"].clone()).collect();
        assert_eq!(starts, vec![0, 4, 8]);
        assert_eq!(splits[2].meta["split_id"], 2);
        assert_eq!(splits[0].meta["source_id"], doc.id.as_str());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let settings = SplitterSettings::default();
        let splits = split_document(&Document::new("just a few words"), &settings);
        assert_eq!(texts(&splits), vec!["just a few words"]);
        assert_eq!(splits[0].meta["page_number"], 1);
    }

    #[test]
    fn exact_fit_does_not_emit_a_tail() {
        let settings = SplitterSettings::new(SplitBy::Word, 3, 1).expect("settings");
        let splits = split_document(&Document::new("a b c d e"), &settings);
        assert_eq!(texts(&splits), vec!["a b c ", "c d e"]);
    }

    #[test]
    fn empty_document_yields_nothing() {
        assert!(split_document(&Document::new(""), &SplitterSettings::default()).is_empty());
    }

    #[test]
    fn passages_and_sentences() {
        let by_passage = SplitterSettings::new(SplitBy::Passage, 1, 0).expect("settings");
        let splits = split_document(&Document::new("one\n\ntwo\n\nthree"), &by_passage);
        assert_eq!(texts(&splits), vec!["one\n\n", "two\n\n", "three"]);

        let by_sentence = SplitterSettings::new(SplitBy::Sentence, 2, 0).expect("settings");
        let splits = split_document(&Document::new("A. B. C."), &by_sentence);
        assert_eq!(texts(&splits), vec!["A. B.", " C."]);
    }

    #[test]
    fn page_numbers_follow_form_feeds() {
        let settings = SplitterSettings::new(SplitBy::Word, 2, 0).expect("settings");
        let splits = split_document(&Document::new("a b\u{c}c d e f"), &settings);
        assert_eq!(texts(&splits), vec!["a b\u{c}c ", "d e ", "f"]);
        let pages: Vec<_> = splits.iter().map(|d| d.meta["page_number"].clone()).collect();
        assert_eq!(pages, vec![1, 2, 2]);

        let by_page = SplitterSettings::new(SplitBy::Page, 1, 0).expect("settings");
        let splits = split_document(&Document::new("p1\u{c}p2\u{c}p3"), &by_page);
        let pages: Vec<_> = splits.iter().map(|d| d.meta["page_number"].clone()).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[test]
    fn metadata_is_inherited() {
        let mut meta = ragpipe_shared::Meta::new();
        meta.insert("file_path".into(), "soup.txt".into());
        let doc = Document::with_meta("a b", meta);
        let splits = split_documents(&[doc], &SplitterSettings::default());
        assert_eq!(splits[0].meta["file_path"], "soup.txt");
    }

    #[test]
    fn settings_from_config() {
        let config = SplitterConfig {
            split_by: "passage".into(),
            split_length: 4,
            split_overlap: 1,
        };
        let settings = SplitterSettings::try_from(&config).expect("settings");
        assert_eq!(settings.split_by(), SplitBy::Passage);
        let bad = SplitterConfig {
            split_by: "chapter".into(),
            ..config
        };
        assert!(SplitterSettings::try_from(&bad).is_err());
    }
}
