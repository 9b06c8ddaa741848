//! Text cleaning passes for converted documents.
//!
//! Pages (separated by form feed) are cleaned independently so page
//! boundaries survive for the splitter.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use ragpipe_shared::{Document, RagPipeError, Result};

use crate::converters::PAGE_BREAK;

/// Which cleaning passes to run.
#[derive(Debug, Clone)]
pub struct CleanerSettings {
    pub remove_empty_lines: bool,
    pub remove_extra_whitespaces: bool,
    /// Drop a first or last line that every page repeats.
    pub remove_repeated_headers_footers: bool,
    /// Literal substrings deleted from the text.
    pub remove_substrings: Vec<String>,
    /// Every match of this pattern is deleted.
    pub remove_regex: Option<Regex>,
}

impl Default for CleanerSettings {
    fn default() -> Self {
        Self {
            remove_empty_lines: true,
            remove_extra_whitespaces: true,
            remove_repeated_headers_footers: false,
            remove_substrings: Vec::new(),
            remove_regex: None,
        }
    }
}

impl CleanerSettings {
    /// Compile `pattern` into the removal regex.
    pub fn with_remove_regex(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| RagPipeError::validation(format!("invalid cleaner regex: {e}")))?;
        self.remove_regex = Some(regex);
        Ok(self)
    }
}

/// Clean one document. The result gets a fresh id; metadata is kept.
pub fn clean_document(doc: &Document, settings: &CleanerSettings) -> Document {
    let mut text = doc.content.clone();

    if settings.remove_repeated_headers_footers {
        text = remove_repeated_edges(&text);
    }
    if settings.remove_empty_lines {
        text = per_page(&text, |page| {
            page.lines()
                .filter(|line| !line.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        });
    }
    if settings.remove_extra_whitespaces {
        static WS_RUN_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\s\s+").expect("valid regex"));
        text = per_page(&text, |page| {
            WS_RUN_RE.replace_all(page, " ").trim().to_string()
        });
    }
    for substring in &settings.remove_substrings {
        text = text.replace(substring.as_str(), "");
    }
    if let Some(regex) = &settings.remove_regex {
        text = per_page(&text, |page| regex.replace_all(page, "").trim().to_string());
    }

    debug!(id = %doc.id, before = doc.content.len(), after = text.len(), "cleaned document");
    let mut cleaned = Document::with_meta(text, doc.meta.clone());
    cleaned.score = doc.score;
    cleaned
}

fn repeated_on_every_page<'a>(mut lines: impl Iterator<Item = Option<&'a str>>) -> bool {
    match lines.next().flatten().map(str::trim) {
        Some(first) if !first.is_empty() => lines.all(|l| l.map(str::trim) == Some(first)),
        _ => false,
    }
}

fn per_page(text: &str, clean: impl Fn(&str) -> String) -> String {
    text.split(PAGE_BREAK)
        .map(clean)
        .collect::<Vec<_>>()
        .join(&PAGE_BREAK.to_string())
}

/// Remove a header or footer line that is identical on every page.
fn remove_repeated_edges(text: &str) -> String {
    let mut pages: Vec<Vec<&str>> = text
        .split(PAGE_BREAK)
        .map(|page| page.lines().collect())
        .collect();
    if pages.len() < 2 {
        return text.to_string();
    }

    if repeated_on_every_page(pages.iter().map(|p| p.first().copied())) {
        for page in &mut pages {
            page.remove(0);
        }
    }
    if repeated_on_every_page(pages.iter().map(|p| p.last().copied())) {
        for page in &mut pages {
            page.pop();
        }
    }

    pages
        .iter()
        .map(|lines| lines.join("\n"))
        .collect::<Vec<_>>()
        .join(&PAGE_BREAK.to_string())
}
