//! HTML to Markdown conversion.
//!
//! The page's main content is located, tables are rewritten as Markdown
//! tables (htmd does not handle them), the rest goes through `htmd`, and
//! the result is tidied by the passes in [`crate::cleanup`].

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use ragpipe_shared::{RagPipeError, Result};

use crate::cleanup;

/// Tags whose content never reaches the Markdown output.
const SKIPPED_TAGS: [&str; 7] = ["script", "style", "nav", "iframe", "noscript", "svg", "form"];

/// Convert an HTML page to cleaned Markdown.
///
/// `base` resolves relative links (for local files, the file's own URL).
pub fn html_to_markdown(html: &str, base: Option<&Url>) -> Result<String> {
    let content = main_content(html);
    let content = tables_to_markdown(&content);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build();
    let raw = converter
        .convert(&content)
        .map_err(|e| RagPipeError::Conversion(format!("htmd conversion failed: {e}")))?;

    debug!(raw_len = raw.len(), "htmd conversion complete");
    Ok(cleanup::run_passes(&raw, base))
}

/// Inner HTML of the most specific content container, falling back to `<body>`.
fn main_content(html: &str) -> String {
    const CONTAINERS: [&str; 5] = ["[role=\"main\"]", "article", "main", ".content", "body"];

    let doc = Html::parse_document(html);
    CONTAINERS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| doc.select(&selector).next().map(|el| el.inner_html()))
        .unwrap_or_else(|| html.to_string())
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

fn tables_to_markdown(html: &str) -> String {
    let Ok(table_sel) = Selector::parse("table") else {
        return html.to_string();
    };
    let fragment = Html::parse_fragment(html);

    let mut result = html.to_string();
    for table in fragment.select(&table_sel) {
        let rendered = render_table(&table);
        result = result.replacen(&table.html(), &rendered, 1);
    }
    result
}

/// Render one `<table>` as a pipe table. The first row is the header.
fn render_table(table: &ElementRef) -> String {
    let (Ok(row_sel), Ok(cell_sel)) = (Selector::parse("tr"), Selector::parse("th, td")) else {
        return String::new();
    };

    let mut rows: Vec<Vec<String>> = table
        .select(&row_sel)
        .map(|tr| {
            tr.select(&cell_sel)
                .map(|cell| {
                    let text: String = cell.text().collect();
                    text.split_whitespace().collect::<Vec<_>>().join(" ")
                })
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }
    for row in &mut rows {
        row.resize(width, String::new());
    }

    let line = |cells: &[String]| format!("| {} |\n", cells.join(" | "));
    let mut md = String::from("\n\n");
    md.push_str(&line(&rows[0]));
    md.push_str(&line(&vec!["---".to_string(); width]));
    for row in &rows[1..] {
        md.push_str(&line(row));
    }
    md.push('\n');
    md
}
