//! Conversion of extracted content into the requested representation.
//!
//! Markdown goes through `htmd` with ATX headings and fenced code blocks.
//! A `<pre>` without an inner `<code>` is wrapped in one first so that it
//! still becomes a fence with its indentation intact.
//! Text is produced by a DOM walk that drops all markup: inline whitespace
//! collapses to single spaces, paragraphs are separated by a blank line and
//! list items, table rows and `<br>` by a single line break.

use htmd::HtmlToMarkdown;
use htmd::options::{CodeBlockStyle, HeadingStyle, Options};
use regex::{Captures, Regex};
use scraper::node::Node;
use scraper::{ElementRef, Html};
use std::borrow::Cow;
use std::sync::LazyLock;

use super::dom::{MAX_HTML_NESTING_DEPTH, NON_CONTENT_ELEMENTS};
use super::{ReadableContent, Representation};
use crate::error::{EngineError, EngineResult};

static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n{3,}").expect("EXCESS_NEWLINES: hardcoded regex is valid")
});

static TRAILING_SPACES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)[ \t]+$").expect("TRAILING_SPACES: hardcoded regex is valid")
});

static PREFORMATTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<pre(\s[^>]*)?>(.*?)</pre>").expect("PREFORMATTED: hardcoded regex is valid")
});

/// Elements separated from their neighbours by a blank line.
const PARAGRAPH_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "dialog", "div", "dl", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hgroup",
    "hr", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "ul",
];

/// Elements separated from their neighbours by a single line break.
const LINE_ELEMENTS: &[&str] = &["li", "dt", "dd", "tr", "caption", "br", "option"];

const CELL_ELEMENTS: &[&str] = &["td", "th"];

/// Render `content` in `representation`.
///
/// # Errors
///
/// [`EngineError::ExtractionFailed`] when the markdown converter rejects the
/// fragment.
pub fn convert(content: &ReadableContent, representation: Representation) -> EngineResult<String> {
    match representation {
        Representation::Markdown => html_to_markdown(&content.content_html),
        Representation::Text => Ok(content.text_content.clone()),
        Representation::Html => Ok(content.content_html.clone()),
    }
}

fn create_converter() -> HtmlToMarkdown {
    HtmlToMarkdown::builder()
        .options(Options {
            heading_style: HeadingStyle::Atx,
            code_block_style: CodeBlockStyle::Fenced,
            ..Default::default()
        })
        .build()
}

/// Deterministic HTML to Markdown.
///
/// # Errors
///
/// [`EngineError::ExtractionFailed`] when `htmd` fails.
pub fn html_to_markdown(html: &str) -> EngineResult<String> {
    let prepared = wrap_bare_preformatted(html);
    let raw = create_converter()
        .convert(&prepared)
        .map_err(|e| EngineError::ExtractionFailed(format!("Markdown conversion failed: {e}")))?;
    let trimmed = TRAILING_SPACES.replace_all(&raw, "");
    let collapsed = EXCESS_NEWLINES.replace_all(&trimmed, "\n\n");
    Ok(collapsed.trim_start_matches('\n').trim_end().to_string())
}

/// `<pre>text</pre>` becomes `<pre><code>text</code></pre>`.
///
/// The newline the HTML parser would drop right after `<pre>` is dropped here
/// too, since it no longer opens the element once `<code>` precedes it.
fn wrap_bare_preformatted(html: &str) -> Cow<'_, str> {
    PREFORMATTED.replace_all(html, |caps: &Captures<'_>| {
        let attrs = caps.get(1).map_or("", |m| m.as_str());
        let body = caps.get(2).map_or("", |m| m.as_str());
        if body.to_ascii_lowercase().contains("<code") {
            return caps[0].to_string();
        }
        let body = body
            .strip_prefix("\r\n")
            .or_else(|| body.strip_prefix('\n'))
            .unwrap_or(body);
        format!("<pre{attrs}><code>{body}</code></pre>")
    })
}

/// Strip all markup from an HTML fragment.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut writer = TextWriter::default();
    writer.walk(&fragment.root_element(), 0);
    writer.out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
enum Break {
    #[default]
    None,
    Space,
    Line,
    Paragraph,
}

#[derive(Default)]
struct TextWriter {
    out: String,
    pending: Break,
    pre_depth: usize,
}

impl TextWriter {
    fn walk(&mut self, element: &ElementRef, depth: usize) {
        if depth > MAX_HTML_NESTING_DEPTH {
            return;
        }
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(child_element) = ElementRef::wrap(child) {
                        self.element(&child_element, depth + 1);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, element: &ElementRef, depth: usize) {
        let name = element.value().name();
        if NON_CONTENT_ELEMENTS.contains(&name) {
            return;
        }

        let boundary = if PARAGRAPH_ELEMENTS.contains(&name) {
            Break::Paragraph
        } else if LINE_ELEMENTS.contains(&name) {
            Break::Line
        } else if CELL_ELEMENTS.contains(&name) {
            Break::Space
        } else {
            Break::None
        };

        self.boundary(boundary);
        let is_pre = name == "pre";
        if is_pre {
            self.pre_depth += 1;
        }
        self.walk(element, depth);
        if is_pre {
            self.pre_depth -= 1;
        }
        self.boundary(boundary);
    }

    fn boundary(&mut self, boundary: Break) {
        self.pending = self.pending.max(boundary);
    }

    fn text(&mut self, text: &str) {
        if self.pre_depth > 0 {
            for line in text.split_inclusive('\n') {
                let content = line.trim_end_matches(['\n', '\r']);
                if !content.trim().is_empty() {
                    self.flush_pending();
                    self.out.push_str(content.trim_end());
                }
                if line.ends_with('\n') {
                    self.boundary(Break::Line);
                }
            }
            return;
        }

        if text.starts_with(char::is_whitespace) {
            self.boundary(Break::Space);
        }
        for (index, word) in text.split_whitespace().enumerate() {
            if index > 0 {
                self.boundary(Break::Space);
            }
            self.flush_pending();
            self.out.push_str(word);
        }
        if text.ends_with(char::is_whitespace) {
            self.boundary(Break::Space);
        }
    }

    fn flush_pending(&mut self) {
        if !self.out.is_empty() {
            match self.pending {
                Break::None => {}
                Break::Space => self.out.push(' '),
                Break::Line => self.out.push('\n'),
                Break::Paragraph => self.out.push_str("\n\n"),
            }
        }
        self.pending = Break::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_uses_atx_headings_and_fences() {
        let md = html_to_markdown("<h2>Setup</h2><pre><code>cargo build</code></pre>")
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(md.starts_with("## Setup"));
        assert!(md.contains("```"));
        assert!(md.contains("cargo build"));
    }

    #[test]
    fn bare_preformatted_becomes_a_fence_with_indentation() {
        let html = "<p>Run:</p><pre>  indented\n    more</pre>";
        let md = html_to_markdown(html).unwrap_or_else(|e| panic!("{e}"));
        assert!(md.starts_with("Run:\n\n```"));
        assert!(md.ends_with("```\n  indented\n    more\n```"));
        assert!(html_to_text(html).len() <= md.len());
    }

    #[test]
    fn leading_indentation_survives_at_document_start() {
        let html = "<pre>  indented\n    more</pre>";
        let md = html_to_markdown(html).unwrap_or_else(|e| panic!("{e}"));
        assert!(md.contains("\n  indented\n    more\n"));
        assert_eq!(html_to_text(html), "  indented\n    more");
        assert!(html_to_text(html).len() <= md.len());
    }

    #[test]
    fn preformatted_with_code_child_is_left_alone() {
        let html = r#"<pre class="x"><code class="language-rust">let x = a * b;</code></pre>"#;
        assert_eq!(wrap_bare_preformatted(html), html);
        let md = html_to_markdown(html).unwrap_or_else(|e| panic!("{e}"));
        assert!(md.starts_with("```rust\n"));
        assert!(md.contains("let x = a * b;"));
    }

    #[test]
    fn parser_dropped_newline_is_dropped_when_wrapping() {
        assert_eq!(
            wrap_bare_preformatted("<pre id=\"a\">\nline</pre>"),
            "<pre id=\"a\"><code>line</code></pre>"
        );
    }

    #[test]
    fn text_strips_markup_and_keeps_paragraphs() {
        let text = html_to_text(
            "<h1>Title</h1><p>First   <em>para</em>graph\n here.</p><ul><li>one</li><li>two</li></ul>",
        );
        assert_eq!(text, "Title\n\nFirst paragraph here.\n\none\ntwo");
    }

    #[test]
    fn text_keeps_preformatted_lines() {
        let text = html_to_text("<p>Run:</p><pre>line one\n  line two\n</pre>");
        assert_eq!(text, "Run:\n\nline one\n  line two");
    }

    #[test]
    fn text_separates_cells_and_skips_scripts() {
        let text = html_to_text(
            "<table><tr><td>a</td><td>b</td></tr><tr><td>c</td></tr></table><script>var x;</script>",
        );
        assert_eq!(text, "a b\nc");
    }

    #[test]
    fn text_is_not_longer_than_markdown() {
        let html = "<h1>Guide</h1><p>Some <strong>bold</strong> and <a href=\"https://example.com/x\">a link</a>.</p><ul><li>alpha</li><li>beta</li></ul>";
        let md = html_to_markdown(html).unwrap_or_else(|e| panic!("{e}"));
        assert!(html_to_text(html).len() <= md.len());
    }
}
