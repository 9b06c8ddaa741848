//! Cleanup passes applied to Markdown produced from HTML.
//!
//! Each pass is a `&str -> String` function; [`run_passes`] applies them
//! in order.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Run every cleanup pass over raw Markdown.
pub(crate) fn run_passes(md: &str, base: Option<&Url>) -> String {
    let mut result = demote_extra_titles(md);
    result = strip_container_tags(&result);
    result = resolve_relative_links(&result, base);
    result = trim_line_ends(&result);
    collapse_blank_runs(&result)
}

// ---------------------------------------------------------------------------
// Headings
// ---------------------------------------------------------------------------

/// Keep the first `#` heading; later ones become `##`.
fn demote_extra_titles(md: &str) -> String {
    static TITLE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^#\s+(.+)$").expect("valid regex"));

    let mut seen_title = false;
    md.lines()
        .map(|line| match TITLE_RE.captures(line) {
            Some(caps) if seen_title => format!("## {}", &caps[1]),
            Some(_) => {
                seen_title = true;
                line.to_string()
            }
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Leftover HTML
// ---------------------------------------------------------------------------

/// Drop layout tags htmd passes through, leaving their text. Fenced code is untouched.
fn strip_container_tags(md: &str) -> String {
    static CONTAINER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary)(?:\s[^>]*)?>",
        )
        .expect("valid regex")
    });

    let mut in_fence = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.to_string();
            }
            if in_fence {
                line.to_string()
            } else {
                CONTAINER_RE.replace_all(line, "").into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Resolve relative link targets against the page's own URL.
///
/// Images, anchors, and absolute URLs are left alone.
fn resolve_relative_links(md: &str, base: Option<&Url>) -> String {
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

    let Some(base) = base else {
        return md.to_string();
    };

    LINK_RE
        .replace_all(md, |caps: &regex::Captures| {
            let (bang, text, href) = (&caps[1], &caps[2], &caps[3]);
            let absolute = href.starts_with('#') || Url::parse(href).is_ok();
            if !bang.is_empty() || absolute {
                return caps[0].to_string();
            }
            match base.join(href) {
                Ok(resolved) => format!("[{text}]({resolved})"),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Whitespace
// ---------------------------------------------------------------------------

fn trim_line_ends(md: &str) -> String {
    md.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

/// At most one blank line between blocks; no leading or trailing blank lines.
fn collapse_blank_runs(md: &str) -> String {
    static BLANK_RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    BLANK_RUN_RE.replace_all(md.trim_matches('\n'), "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_title_is_demoted() {
        let out = demote_extra_titles("# One\ntext\n# Two\n## Three");
        assert_eq!(out, "# One\ntext\n## Two\n## Three");
    }

    #[test]
    fn container_tags_removed_outside_fences() {
        let md = "<div class=\"x\">kept</div>\n```\n<div>code</div>\n```";
        let out = strip_container_tags(md);
        assert!(out.starts_with("kept\n"));
        assert!(out.contains("<div>code</div>"));
    }

    #[test]
    fn relative_links_resolve_against_base() {
        let base = Url::parse("file:///data/recipes/index.html").expect("url");
        let md = "[next](pasta.html) [abs](https://example.com/a) ![img](pic.png) [top](#top)";
        let out = resolve_relative_links(md, Some(&base));
        assert!(out.contains("[next](file:///data/recipes/pasta.html)"));
        assert!(out.contains("[abs](https://example.com/a)"));
        assert!(out.contains("![img](pic.png)"));
        assert!(out.contains("[top](#top)"));
    }

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(collapse_blank_runs("\n\na\n\n\n\nb\n\n"), "a\n\nb");
    }

    #[test]
    fn full_pass_order() {
        let out = run_passes("# A   \n\n\n\n# B\n", None);
        assert_eq!(out, "# A\n\n## B");
    }
}
