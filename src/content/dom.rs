//! DOM helpers shared by readability extraction and conversion.
//!
//! Serialization walks the parsed tree once, skipping a set of excluded
//! nodes, so removing noise never needs a serialize/re-parse round trip.

use ego_tree::NodeId;
use scraper::node::Node;
use scraper::ElementRef;
use std::collections::HashSet;
use url::Url;

/// Maximum HTML input size accepted for extraction (10 MB)
pub const MAX_HTML_SIZE: usize = 10 * 1024 * 1024;

/// Nesting depth past which serialization and text collection stop
pub const MAX_HTML_NESTING_DEPTH: usize = 100;

pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text never counts as content.
pub const NON_CONTENT_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "head", "svg", "canvas", "iframe", "object",
];

/// Attributes holding a URL that is resolved against the page URL.
const URL_ATTRIBUTES: &[&str] = &["href", "src", "poster", "action", "cite"];

/// Serializes elements while skipping excluded nodes and unsafe attributes.
pub struct Serializer<'a> {
    excluded: &'a HashSet<NodeId>,
    base_url: &'a Url,
    output: String,
}

impl<'a> Serializer<'a> {
    #[must_use]
    pub fn new(excluded: &'a HashSet<NodeId>, base_url: &'a Url) -> Self {
        Self {
            excluded,
            base_url,
            output: String::new(),
        }
    }

    /// Serialize `element` including its own tag.
    pub fn element(&mut self, element: &ElementRef) {
        self.write_element(element, 0);
    }

    /// Serialize only the children of `element`.
    pub fn children(&mut self, element: &ElementRef) {
        self.write_children(element, 0);
    }

    #[must_use]
    pub fn finish(self) -> String {
        self.output
    }

    fn write_element(&mut self, element: &ElementRef, depth: usize) {
        if self.excluded.contains(&element.id()) {
            return;
        }
        let name = element.value().name();
        if NON_CONTENT_ELEMENTS.contains(&name) {
            return;
        }

        self.output.push('<');
        self.output.push_str(name);
        for (attr, value) in element.value().attrs() {
            self.write_attribute(attr, value);
        }
        self.output.push('>');

        if VOID_ELEMENTS.contains(&name) {
            return;
        }
        self.write_children(element, depth + 1);
        self.output.push_str("</");
        self.output.push_str(name);
        self.output.push('>');
    }

    fn write_children(&mut self, element: &ElementRef, depth: usize) {
        if depth > MAX_HTML_NESTING_DEPTH {
            tracing::warn!(
                element = element.value().name(),
                depth,
                limit = MAX_HTML_NESTING_DEPTH,
                "Maximum HTML nesting depth exceeded, truncating output"
            );
            return;
        }

        for child in element.children() {
            match child.value() {
                Node::Text(text) => {
                    html_escape::encode_text_to_string(&**text, &mut self.output);
                }
                Node::Element(_) => {
                    if let Some(child_element) = ElementRef::wrap(child) {
                        self.write_element(&child_element, depth);
                    }
                }
                _ => {}
            }
        }
    }

    fn write_attribute(&mut self, name: &str, value: &str) {
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("on") || lower == "style" {
            return;
        }

        let resolved;
        let value = if URL_ATTRIBUTES.contains(&lower.as_str()) {
            let trimmed = value.trim();
            if trimmed.to_ascii_lowercase().starts_with("javascript:") {
                return;
            }
            resolved = resolve_url(self.base_url, trimmed);
            resolved.as_str()
        } else {
            value
        };

        self.output.push(' ');
        self.output.push_str(name);
        self.output.push_str("=\"");
        html_escape::encode_double_quoted_attribute_to_string(value, &mut self.output);
        self.output.push('"');
    }
}

/// Resolve `href` against `base`, leaving fragments and unparsable values alone.
#[must_use]
pub fn resolve_url(base: &Url, href: &str) -> String {
    if href.is_empty() || href.starts_with('#') {
        return href.to_string();
    }
    base.join(href)
        .map_or_else(|_| href.to_string(), |url| url.to_string())
}

/// Concatenated text under `element`, skipping excluded and non-content nodes.
#[must_use]
pub fn visible_text(element: &ElementRef, excluded: &HashSet<NodeId>) -> String {
    let mut text = String::new();
    collect_text(element, excluded, &mut text, 0);
    text
}

fn collect_text(element: &ElementRef, excluded: &HashSet<NodeId>, out: &mut String, depth: usize) {
    if depth > MAX_HTML_NESTING_DEPTH
        || excluded.contains(&element.id())
        || NON_CONTENT_ELEMENTS.contains(&element.value().name())
    {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(&child_element, excluded, out, depth + 1);
                }
            }
            _ => {}
        }
    }
}

/// Collapse runs of whitespace into single spaces and trim.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `element` or one of its ancestors is in `excluded`.
#[must_use]
pub fn is_excluded(element: &ElementRef, excluded: &HashSet<NodeId>) -> bool {
    excluded.contains(&element.id()) || element.ancestors().any(|node| excluded.contains(&node.id()))
}
