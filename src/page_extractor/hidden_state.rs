//! Hidden state harvesting: JSON-LD, hydration globals, meta tags, links.
//!
//! [`extract_hidden_state`] evaluates scripts in the live page; every probe
//! is independent and defaults to empty on failure. [`harvest_static`] does
//! the same from serialized HTML and is used to fill whatever the live probes
//! could not read.

use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, trace};
use url::Url;

use super::js_scripts::{JSON_LD_SCRIPT, LINKS_SCRIPT, META_SCRIPT, hydration_probe};
use super::schema::{HYDRATION_SOURCES, HiddenState, PageMetadata, empty_hydration};
use crate::error::{EngineError, EngineResult};
use crate::session::SessionPage;

static JSON_LD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#)
        .expect("BUG: hardcoded JSON-LD selector is invalid")
});

static META_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("meta[content]").expect("BUG: hardcoded CSS selector 'meta[content]' is invalid")
});

static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("title").expect("BUG: hardcoded CSS selector 'title' is invalid")
});

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href]").expect("BUG: hardcoded CSS selector 'a[href]' is invalid")
});

/// Serialized hydration payloads some frameworks embed as script elements.
static EMBEDDED_STATE_SELECTORS: LazyLock<Vec<(&'static str, Selector)>> = LazyLock::new(|| {
    [
        ("next_data", "script#__NEXT_DATA__"),
        ("nuxt_data", "script#__NUXT_DATA__"),
    ]
    .into_iter()
    .map(|(key, css)| {
        let selector = Selector::parse(css)
            .unwrap_or_else(|e| panic!("BUG: hardcoded selector '{css}' is invalid: {e}"));
        (key, selector)
    })
    .collect()
});

#[derive(Debug, Default, Deserialize)]
struct MetaProbe {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Harvest hidden state from the live page.
///
/// # Errors
///
/// Only [`EngineError::Cancelled`]; every other probe failure degrades to an
/// empty value for that probe.
pub async fn extract_hidden_state(page: &SessionPage, base_url: &Url) -> EngineResult<HiddenState> {
    let json_ld = probe(page, JSON_LD_SCRIPT, "json_ld").await?;
    let structured_data = match json_ld {
        Value::Array(blocks) => parse_json_ld_blocks(blocks.iter().filter_map(Value::as_str)),
        _ => Vec::new(),
    };

    let mut hydration = empty_hydration();
    for source in HYDRATION_SOURCES {
        let value = probe(page, &hydration_probe(source.expression), source.key).await?;
        hydration.insert(source.key.to_string(), value);
    }

    let meta: MetaProbe = serde_json::from_value(probe(page, META_SCRIPT, "meta").await?)
        .unwrap_or_default();

    let links = probe(page, LINKS_SCRIPT, "links").await?;
    let outgoing_links = match links {
        Value::Array(hrefs) => normalize_links(hrefs.iter().filter_map(Value::as_str), base_url),
        _ => Vec::new(),
    };

    Ok(HiddenState {
        document_title: meta.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        structured_data,
        hydration,
        metadata: PageMetadata::from_tags(&meta.tags),
        outgoing_links,
    })
}

/// Evaluate one probe; failures other than cancellation become `null`.
async fn probe(page: &SessionPage, script: &str, name: &str) -> EngineResult<Value> {
    match page.evaluate(script).await {
        Ok(value) => Ok(value),
        Err(EngineError::Cancelled(reason)) => Err(EngineError::Cancelled(reason)),
        Err(e) => {
            debug!(probe = name, "Hidden state probe failed: {e}");
            Ok(Value::Null)
        }
    }
}

/// Parse JSON-LD blocks, skipping invalid ones. Top-level arrays are
/// flattened; `@graph` containers are kept as-is.
#[must_use]
pub fn parse_json_ld_blocks<'a, I>(blocks: I) -> Vec<Value>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut parsed = Vec::new();
    for block in blocks {
        match serde_json::from_str::<Value>(block.trim()) {
            Ok(Value::Array(items)) => parsed.extend(items.into_iter().filter(Value::is_object)),
            Ok(value @ Value::Object(_)) => parsed.push(value),
            Ok(_) => trace!("Ignoring JSON-LD block that is not an object"),
            Err(e) => debug!("Skipping invalid JSON-LD block: {e}"),
        }
    }
    parsed
}

/// Resolve, keep http(s) only, drop fragments, dedupe in document order.
#[must_use]
pub fn normalize_links<'a, I>(hrefs: I, base_url: &Url) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for href in hrefs {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let Ok(mut url) = base_url.join(href) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        url.set_fragment(None);
        let link = url.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }
    links
}

/// Harvest hidden state from serialized HTML.
#[must_use]
pub fn harvest_static(html: &str, base_url: &Url) -> HiddenState {
    let document = Html::parse_document(html);

    let json_ld_texts: Vec<String> = document
        .select(&JSON_LD_SELECTOR)
        .map(|script| script.text().collect::<String>())
        .collect();
    let structured_data = parse_json_ld_blocks(json_ld_texts.iter().map(String::as_str));

    let mut hydration = empty_hydration();
    for (key, selector) in EMBEDDED_STATE_SELECTORS.iter() {
        let Some(script) = document.select(selector).next() else {
            continue;
        };
        let text: String = script.text().collect();
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => {
                hydration.insert((*key).to_string(), value);
            }
            Err(e) => debug!(key, "Embedded hydration payload is not JSON: {e}"),
        }
    }

    let mut tags = BTreeMap::new();
    for meta in document.select(&META_SELECTOR) {
        let element = meta.value();
        let key = element
            .attr("property")
            .or_else(|| element.attr("name"))
            .or_else(|| element.attr("itemprop"));
        if let (Some(key), Some(content)) = (key, element.attr("content")) {
            tags.entry(key.trim().to_lowercase())
                .or_insert_with(|| content.to_string());
        }
    }

    let document_title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|title| title.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty());

    let outgoing_links = normalize_links(
        document
            .select(&LINK_SELECTOR)
            .filter_map(|a| a.value().attr("href")),
        base_url,
    );

    HiddenState {
        document_title,
        structured_data,
        hydration,
        metadata: PageMetadata::from_tags(&tags),
        outgoing_links,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/blog/post").unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn json_ld_skips_invalid_and_flattens_arrays() {
        let blocks = [
            r#"{"@type": "Article", "headline": "Hello"}"#,
            "{ not json",
            r#"[{"@type": "Person"}, {"@type": "Organization"}, 3]"#,
            r#"{"@context": "https://schema.org", "@graph": [{"@type": "WebPage"}]}"#,
        ];
        let parsed = parse_json_ld_blocks(blocks);
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[0]["headline"], "Hello");
        assert_eq!(parsed[2]["@type"], "Organization");
        assert!(parsed[3]["@graph"].is_array());
    }

    #[test]
    fn links_are_resolved_filtered_and_deduplicated() {
        let links = normalize_links(
            [
                "/about",
                "https://example.com/about#team",
                "mailto:hi@example.com",
                "javascript:void(0)",
                "#top",
                "../contact",
                "https://other.example/",
            ],
            &base(),
        );
        assert_eq!(
            links,
            [
                "https://example.com/about",
                "https://example.com/contact",
                "https://other.example/",
            ]
        );
    }

    #[test]
    fn static_harvest_reads_next_data_and_meta() {
        let html = r#"
            <html><head>
                <title> Store </title>
                <meta property="og:site_name" content="Example Store">
                <meta name="description" content="Buy things">
                <script type="application/ld+json">{"@type": "Product", "name": "Lamp"}</script>
            </head><body>
                <div id="__next"></div>
                <script id="__NEXT_DATA__" type="application/json">{"props": {"pageProps": {"sku": 42}}}</script>
            </body></html>
        "#;
        let state = harvest_static(html, &base());
        assert_eq!(state.document_title.as_deref(), Some("Store"));
        assert_eq!(state.metadata.site_name.as_deref(), Some("Example Store"));
        assert_eq!(state.metadata.description.as_deref(), Some("Buy things"));
        assert_eq!(state.structured_data[0]["name"], "Lamp");
        assert_eq!(state.hydration["next_data"]["props"]["pageProps"]["sku"], 42);
        assert!(state.hydration["apollo_state"].is_null());
    }
}
