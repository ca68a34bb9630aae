//! Readability-style main content extraction.
//!
//! Text blocks are scored by length and comma count; scores propagate to the
//! parent (full), grandparent (half) and great-grandparent (a third). Each
//! candidate starts from a weight derived from its tag and its class/id
//! names and is scaled down by its link density. The best candidate is
//! joined with strongly scored siblings. When nothing scores, semantic
//! containers (`main`, `article`, ...) are tried before falling back to
//! `<body>`.

use ego_tree::NodeId;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use super::ReadableContent;
use super::convert::html_to_text;
use super::dom::{MAX_HTML_SIZE, Serializer, collapse_whitespace, is_excluded, visible_text};
use crate::error::{EngineError, EngineResult};

/// Blocks shorter than this (characters) are not scored.
const MIN_BLOCK_CHARS: usize = 25;
const MAX_EXCERPT_CHARS: usize = 500;
const MAX_BYLINE_CHARS: usize = 100;

static UNLIKELY_CANDIDATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)-ad-|ai2html|banner|breadcrumbs|combx|comment|community|cover-wrap|disqus|extra|footer|gdpr|header|legends|menu|related|remark|replies|rss|shoutbox|sidebar|skyscraper|social|sponsor|supplemental|ad-break|agegate|pagination|pager|popup|yom-remote|cookie|newsletter",
    )
    .expect("UNLIKELY_CANDIDATES: hardcoded regex is valid")
});

static MAYBE_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)and|article|body|column|content|main|shadow")
        .expect("MAYBE_CANDIDATE: hardcoded regex is valid")
});

static POSITIVE_WEIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)article|body|content|entry|hentry|h-entry|main|page|pagination|post|text|blog|story")
        .expect("POSITIVE_WEIGHT: hardcoded regex is valid")
});

static NEGATIVE_WEIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)-ad-|hidden|^hid$| hid$| hid |^hid |banner|combx|comment|com-|contact|foot|footer|footnote|gdpr|masthead|media|meta|outbrain|promo|related|scroll|share|shoutbox|sidebar|skyscraper|sponsor|shopping|tags|tool|widget",
    )
    .expect("NEGATIVE_WEIGHT: hardcoded regex is valid")
});

static TITLE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r" [|\-–—\\/>»:] ").expect("TITLE_SEPARATOR: hardcoded regex is valid")
});

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("BUG: hardcoded selector '{css}' is invalid: {e}"))
}

/// Always-noise elements, removed before scoring.
static NOISE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        "script, style, noscript, template, iframe, object, embed, form, button, input, select, textarea, \
         nav, aside, footer, dialog, \
         .sidebar, #sidebar, .navigation, .menu, .ads, .advertisement, .social-share, \
         .comments, #comments, .related-posts, .cookie-notice, .popup, .modal, \
         [hidden], [aria-hidden='true'], [style*='display:none'], [style*='display: none']",
    )
});

static ALL_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| selector("body *"));

static SCORABLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector("p, pre, td, blockquote, div, section"));

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));

static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("title"));

static H1_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("h1"));

static BODY_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("body"));

static PARAGRAPH_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("p"));

static AUTHOR_META_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector("meta[name='author'][content], meta[property='article:author'][content]"));

static BYLINE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    selector("[rel='author'], [itemprop='author'], .byline, .author, .writtenby")
});

/// Semantic containers tried in order when scoring finds nothing.
static SEMANTIC_CONTAINERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "main",
        "article",
        "[role='main']",
        "#main-content",
        ".main-content",
        "#content",
        ".content",
        ".post-content",
        ".entry-content",
        "[itemprop='articleBody']",
        ".article-body",
        ".story-body",
    ]
    .into_iter()
    .map(selector)
    .collect()
});

/// Block-level children that stop a `div`/`section` from being scored as a
/// paragraph of its own.
const BLOCK_CHILDREN: &[&str] = &[
    "blockquote", "dl", "div", "img", "ol", "p", "pre", "table", "ul", "section", "article",
    "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Identify the main content of `raw_html`.
///
/// # Errors
///
/// [`EngineError::ExtractionFailed`] for blank or oversized input, or when the
/// document has no body.
pub fn extract_content(raw_html: &str, base_url: &Url) -> EngineResult<ReadableContent> {
    if raw_html.trim().is_empty() {
        return Err(EngineError::ExtractionFailed("Document is empty".to_string()));
    }
    if raw_html.len() > MAX_HTML_SIZE {
        return Err(EngineError::ExtractionFailed(format!(
            "HTML input too large: {} bytes (maximum {} MB)",
            raw_html.len(),
            MAX_HTML_SIZE / (1024 * 1024)
        )));
    }

    let document = Html::parse_document(raw_html);
    let excluded = noise_nodes(&document);

    let content_html = match top_candidate(&document, &excluded) {
        Some((top, scores)) => {
            debug!(element = top.value().name(), "Selected scored content candidate");
            serialize_with_siblings(&top, &scores, &excluded, base_url)
        }
        None => {
            let container = SEMANTIC_CONTAINERS
                .iter()
                .find_map(|sel| document.select(sel).find(|el| !is_excluded(el, &excluded)))
                .or_else(|| document.select(&BODY_SELECTOR).next())
                .ok_or_else(|| EngineError::ExtractionFailed("Document has no body".to_string()))?;
            debug!(element = container.value().name(), "Falling back to container content");
            let mut serializer = Serializer::new(&excluded, base_url);
            if container.value().name() == "body" {
                serializer.children(&container);
            } else {
                serializer.element(&container);
            }
            serializer.finish()
        }
    };

    let text_content = html_to_text(&content_html);
    let excerpt = first_paragraph(&content_html);

    Ok(ReadableContent {
        title: article_title(&document),
        byline: byline(&document, &excluded),
        excerpt,
        content_html,
        text_content,
    })
}

/// Nodes removed before scoring: fixed noise plus unlikely candidates.
fn noise_nodes(document: &Html) -> HashSet<NodeId> {
    let mut excluded: HashSet<NodeId> = document.select(&NOISE_SELECTOR).map(|el| el.id()).collect();

    for element in document.select(&ALL_ELEMENTS) {
        let name = element.value().name();
        if matches!(name, "body" | "article" | "main" | "a" | "table" | "tbody" | "tr" | "td") {
            continue;
        }
        let signature = class_and_id(&element);
        if signature.is_empty()
            || !UNLIKELY_CANDIDATES.is_match(&signature)
            || MAYBE_CANDIDATE.is_match(&signature)
        {
            continue;
        }
        let wraps_main_content = element
            .descendants()
            .filter_map(ElementRef::wrap)
            .any(|el| matches!(el.value().name(), "article" | "main"));
        if !wraps_main_content {
            excluded.insert(element.id());
        }
    }
    excluded
}

fn class_and_id(element: &ElementRef) -> String {
    let value = element.value();
    format!(
        "{} {}",
        value.attr("class").unwrap_or_default(),
        value.attr("id").unwrap_or_default()
    )
    .trim()
    .to_string()
}

fn class_weight(element: &ElementRef) -> f64 {
    let mut weight = 0.0;
    for attr in ["class", "id"] {
        if let Some(value) = element.value().attr(attr).filter(|v| !v.is_empty()) {
            if NEGATIVE_WEIGHT.is_match(value) {
                weight -= 25.0;
            }
            if POSITIVE_WEIGHT.is_match(value) {
                weight += 25.0;
            }
        }
    }
    weight
}

fn initial_score(element: &ElementRef) -> f64 {
    let tag_score = match element.value().name() {
        "div" | "article" | "main" => 5.0,
        "pre" | "td" | "blockquote" | "section" => 3.0,
        "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" | "form" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" => -5.0,
        _ => 0.0,
    };
    tag_score + class_weight(element)
}

fn is_scorable(element: &ElementRef) -> bool {
    match element.value().name() {
        "div" | "section" => !element
            .children()
            .filter_map(ElementRef::wrap)
            .any(|child| BLOCK_CHILDREN.contains(&child.value().name())),
        _ => true,
    }
}

fn link_density(element: &ElementRef, excluded: &HashSet<NodeId>) -> f64 {
    let total = collapse_whitespace(&visible_text(element, excluded)).chars().count();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = element
        .select(&LINK_SELECTOR)
        .filter(|a| !is_excluded(a, excluded))
        .map(|a| collapse_whitespace(&visible_text(&a, excluded)).chars().count())
        .sum();
    linked as f64 / total as f64
}

type Scores = HashMap<NodeId, f64>;

fn top_candidate<'a>(document: &'a Html, excluded: &HashSet<NodeId>) -> Option<(ElementRef<'a>, Scores)> {
    let mut scores: Scores = HashMap::new();

    for block in document.select(&SCORABLE_SELECTOR) {
        if !is_scorable(&block) || is_excluded(&block, excluded) {
            continue;
        }
        let text = collapse_whitespace(&visible_text(&block, excluded));
        let length = text.chars().count();
        if length < MIN_BLOCK_CHARS {
            continue;
        }

        let commas = text.chars().filter(|c| matches!(c, ',' | '，')).count();
        let content_score = 1.0 + commas as f64 + (length as f64 / 100.0).floor().min(3.0);

        let ancestors = block
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take_while(|el| el.value().name() != "html")
            .take(3);
        for (level, ancestor) in ancestors.enumerate() {
            let divider = match level {
                0 => 1.0,
                1 => 2.0,
                _ => level as f64 * 3.0,
            };
            *scores
                .entry(ancestor.id())
                .or_insert_with(|| initial_score(&ancestor)) += content_score / divider;
        }
    }

    let mut best: Option<(ElementRef<'a>, f64)> = None;
    for (&id, score) in &mut scores {
        let Some(element) = document.tree.get(id).and_then(ElementRef::wrap) else {
            continue;
        };
        *score *= 1.0 - link_density(&element, excluded);
        if best.is_none_or(|(_, top)| *score > top) {
            best = Some((element, *score));
        }
    }

    let (top, _) = best?;
    let top_length = collapse_whitespace(&visible_text(&top, excluded)).chars().count();
    (top_length >= MIN_BLOCK_CHARS).then_some((top, scores))
}

/// Serialize the top candidate together with qualifying siblings.
fn serialize_with_siblings(
    top: &ElementRef,
    scores: &Scores,
    excluded: &HashSet<NodeId>,
    base_url: &Url,
) -> String {
    let mut serializer = Serializer::new(excluded, base_url);
    if top.value().name() == "body" {
        serializer.children(top);
        return serializer.finish();
    }

    let top_score = scores.get(&top.id()).copied().unwrap_or_default();
    let threshold = (top_score * 0.2).max(10.0);

    let siblings: Vec<ElementRef> = top
        .parent()
        .map(|parent| parent.children().filter_map(ElementRef::wrap).collect())
        .unwrap_or_default();

    for sibling in siblings {
        if sibling.id() == top.id() {
            serializer.element(&sibling);
            continue;
        }
        if excluded.contains(&sibling.id()) {
            continue;
        }
        let scored = scores.get(&sibling.id()).is_some_and(|s| *s >= threshold);
        if scored || is_readable_paragraph(&sibling, excluded) {
            serializer.element(&sibling);
        }
    }
    serializer.finish()
}

fn is_readable_paragraph(element: &ElementRef, excluded: &HashSet<NodeId>) -> bool {
    if element.value().name() != "p" {
        return false;
    }
    let text = collapse_whitespace(&visible_text(element, excluded));
    let length = text.chars().count();
    let density = link_density(element, excluded);
    if length > 80 {
        density < 0.25
    } else {
        length > 0 && density == 0.0 && (text.ends_with('.') || text.contains(". "))
    }
}

/// Document title with a trailing site name removed.
fn article_title(document: &Html) -> Option<String> {
    let raw = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let Some(raw) = raw else {
        return document
            .select(&H1_SELECTOR)
            .next()
            .map(|h| collapse_whitespace(&h.text().collect::<String>()))
            .filter(|t| !t.is_empty());
    };

    let cut = TITLE_SEPARATOR.find_iter(&raw).last().map(|m| m.start());
    match cut {
        Some(index) => {
            let head = raw[..index].trim();
            if head.split_whitespace().count() >= 3 {
                Some(head.to_string())
            } else {
                Some(raw)
            }
        }
        None => Some(raw),
    }
}

fn byline(document: &Html, excluded: &HashSet<NodeId>) -> Option<String> {
    let from_meta = document
        .select(&AUTHOR_META_SELECTOR)
        .filter_map(|meta| meta.value().attr("content"))
        .map(collapse_whitespace)
        .find(|author| !author.is_empty());
    if from_meta.is_some() {
        return from_meta;
    }

    document
        .select(&BYLINE_SELECTOR)
        .filter(|el| el.value().name() != "meta")
        .map(|el| collapse_whitespace(&visible_text(&el, excluded)))
        .find(|text| !text.is_empty() && text.chars().count() <= MAX_BYLINE_CHARS)
}

fn first_paragraph(content_html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(content_html);
    fragment
        .select(&PARAGRAPH_SELECTOR)
        .map(|p| collapse_whitespace(&p.text().collect::<String>()))
        .find(|text| !text.is_empty())
        .map(|text| text.chars().take(MAX_EXCERPT_CHARS).collect())
}
