//! Markdown to plain text through the comrak CommonMark AST.
//!
//! Block elements (paragraphs, headings, list items, table rows, code
//! blocks) become paragraphs separated by a blank line. Inline markup is
//! dropped and its text kept. Code blocks are copied verbatim.

use comrak::nodes::{AstNode, NodeValue};
use comrak::{Arena, Options, parse_document};

fn comrak_options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.table = true;
    options.extension.strikethrough = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.extension.front_matter_delimiter = Some("---".to_string());
    options
}

/// Render Markdown source as plain text.
pub fn markdown_to_text(source: &str) -> String {
    let arena = Arena::new();
    let root = parse_document(&arena, source, &comrak_options());

    let mut out = String::new();
    render_node(root, &mut out);
    out
}

fn render_node<'a>(node: &'a AstNode<'a>, out: &mut String) {
    let data = node.data.borrow();
    match &data.value {
        NodeValue::Text(text) => out.push_str(text),
        NodeValue::Code(code) => out.push_str(&code.literal),
        NodeValue::SoftBreak => out.push(' '),
        NodeValue::LineBreak => out.push('\n'),
        NodeValue::CodeBlock(block) => push_block(out, block.literal.trim_end_matches('\n')),
        NodeValue::FrontMatter(_) | NodeValue::HtmlBlock(_) | NodeValue::HtmlInline(_) => {}
        NodeValue::Paragraph | NodeValue::Heading(_) | NodeValue::TableRow(_) => {
            let mut line = String::new();
            for child in node.children() {
                render_node(child, &mut line);
            }
            push_block(out, line.trim());
        }
        NodeValue::TableCell => {
            if !out.is_empty() {
                out.push_str(" | ");
            }
            for child in node.children() {
                render_node(child, out);
            }
        }
        _ => {
            for child in node.children() {
                render_node(child, out);
            }
        }
    }
}

/// Append a block, separated from earlier output by one blank line.
fn push_block(out: &mut String, block: &str) {
    if block.is_empty() {
        return;
    }
    if !out.is_empty() {
        while !out.ends_with("\n\n") {
            out.push('\n');
        }
    }
    out.push_str(block);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_inline_markup() {
        let text = markdown_to_text("# Chili\n\nA *very* **hot** dish with [beans](b.md).");
        assert_eq!(text, "Chili\n\nA very hot dish with beans.");
    }

    #[test]
    fn keeps_code_blocks_verbatim() {
        let text = markdown_to_text("Run:\n\n```sh\ncargo   build\n```\n");
        assert_eq!(text, "Run:\n\ncargo   build");
    }

    #[test]
    fn list_items_become_paragraphs() {
        let text = markdown_to_text("- eggs\n- `flour`\n");
        assert_eq!(text, "eggs\n\nflour");
    }

    #[test]
    fn soft_breaks_join_lines() {
        assert_eq!(markdown_to_text("one\ntwo"), "one two");
    }

    #[test]
    fn tables_render_cells_in_rows() {
        let text = markdown_to_text("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert_eq!(text, "a | b\n\n1 | 2");
    }

    #[test]
    fn front_matter_is_dropped() {
        let text = markdown_to_text("---\ntitle: x\n---\n\nBody");
        assert_eq!(text, "Body");
    }
}
