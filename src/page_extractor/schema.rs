//! Data structures for harvested hidden page state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A framework hydration global: the key it is reported under and the
/// JavaScript expression that reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydrationSource {
    pub key: &'static str,
    pub expression: &'static str,
}

/// Hydration globals harvested from every page, each evaluated on its own.
pub const HYDRATION_SOURCES: &[HydrationSource] = &[
    HydrationSource {
        key: "next_data",
        expression: "window.__NEXT_DATA__",
    },
    HydrationSource {
        key: "nuxt_data",
        expression: "window.__NUXT__",
    },
    HydrationSource {
        key: "apollo_state",
        expression: "window.__APOLLO_STATE__",
    },
    HydrationSource {
        key: "redux_state",
        expression: "window.__INITIAL_STATE__",
    },
    HydrationSource {
        key: "preloaded_state",
        expression: "window.__PRELOADED_STATE__",
    },
    HydrationSource {
        key: "remix_context",
        expression: "window.__remixContext",
    },
];

/// Page metadata with Open Graph / Twitter values preferred over plain meta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub page_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl PageMetadata {
    /// Resolve metadata from raw meta tags (keys already lower-cased).
    #[must_use]
    pub fn from_tags(tags: &BTreeMap<String, String>) -> Self {
        let first = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .filter_map(|key| tags.get(*key))
                .map(|value| value.trim())
                .find(|value| !value.is_empty())
                .map(str::to_string)
        };

        let keywords = first(&["keywords", "news_keywords"])
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            title: first(&["og:title", "twitter:title"]),
            author: first(&["author", "article:author", "twitter:creator", "dc.creator"]),
            date: first(&[
                "article:published_time",
                "og:published_time",
                "date",
                "dc.date",
                "pubdate",
                "datepublished",
            ]),
            description: first(&["og:description", "twitter:description", "description"]),
            image: first(&["og:image", "og:image:url", "twitter:image", "twitter:image:src"]),
            site_name: first(&["og:site_name", "application-name"]),
            page_type: first(&["og:type"]),
            keywords,
        }
    }

    /// Fill fields still missing from `other`.
    pub fn fill_from(&mut self, other: Self) {
        fn fill(slot: &mut Option<String>, value: Option<String>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.title, other.title);
        fill(&mut self.author, other.author);
        fill(&mut self.date, other.date);
        fill(&mut self.description, other.description);
        fill(&mut self.image, other.image);
        fill(&mut self.site_name, other.site_name);
        fill(&mut self.page_type, other.page_type);
        if self.keywords.is_empty() {
            self.keywords = other.keywords;
        }
    }
}

/// State a page carries outside its visible content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HiddenState {
    /// Document `<title>`
    pub document_title: Option<String>,
    /// Parsed JSON-LD objects; arrays are flattened
    pub structured_data: Vec<Value>,
    /// One entry per [`HYDRATION_SOURCES`] key, `null` when absent
    pub hydration: BTreeMap<String, Value>,
    pub metadata: PageMetadata,
    pub outgoing_links: Vec<String>,
}

impl HiddenState {
    /// Whether any hydration global held a value.
    #[must_use]
    pub fn has_hydration(&self) -> bool {
        self.hydration.values().any(|v| !v.is_null())
    }

    #[must_use]
    pub fn has_structured_data(&self) -> bool {
        !self.structured_data.is_empty()
    }

    /// Fill gaps left by live evaluation with statically harvested values.
    pub fn fill_from(&mut self, other: Self) {
        if self.document_title.is_none() {
            self.document_title = other.document_title;
        }
        if self.structured_data.is_empty() {
            self.structured_data = other.structured_data;
        }
        for (key, value) in other.hydration {
            let slot = self.hydration.entry(key).or_insert(Value::Null);
            if slot.is_null() {
                *slot = value;
            }
        }
        self.metadata.fill_from(other.metadata);
        if self.outgoing_links.is_empty() {
            self.outgoing_links = other.outgoing_links;
        }
    }
}

/// Every hydration key mapped to `null`.
#[must_use]
pub fn empty_hydration() -> BTreeMap<String, Value> {
    HYDRATION_SOURCES
        .iter()
        .map(|source| (source.key.to_string(), Value::Null))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn prefers_open_graph_over_plain_meta() {
        let meta = PageMetadata::from_tags(&tags(&[
            ("description", "plain description"),
            ("og:description", "og description"),
            ("twitter:image", "https://cdn.example/t.png"),
            ("og:type", "article"),
        ]));
        assert_eq!(meta.description.as_deref(), Some("og description"));
        assert_eq!(meta.image.as_deref(), Some("https://cdn.example/t.png"));
        assert_eq!(meta.page_type.as_deref(), Some("article"));
    }

    #[test]
    fn falls_back_to_plain_meta_and_skips_blank_values() {
        let meta = PageMetadata::from_tags(&tags(&[
            ("og:description", "   "),
            ("description", "plain description"),
            ("keywords", "rust, async , ,browsers"),
        ]));
        assert_eq!(meta.description.as_deref(), Some("plain description"));
        assert_eq!(meta.keywords, ["rust", "async", "browsers"]);
    }

    #[test]
    fn fill_from_keeps_live_values() {
        let mut live = HiddenState {
            hydration: empty_hydration(),
            ..HiddenState::default()
        };
        live.hydration
            .insert("next_data".into(), serde_json::json!({"page": "/live"}));

        let mut harvested = HiddenState {
            document_title: Some("Static".into()),
            hydration: empty_hydration(),
            ..HiddenState::default()
        };
        harvested
            .hydration
            .insert("next_data".into(), serde_json::json!({"page": "/static"}));
        harvested
            .hydration
            .insert("nuxt_data".into(), serde_json::json!([1, 2]));

        live.fill_from(harvested);
        assert_eq!(live.hydration["next_data"]["page"], "/live");
        assert_eq!(live.hydration["nuxt_data"], serde_json::json!([1, 2]));
        assert_eq!(live.document_title.as_deref(), Some("Static"));
        assert!(live.has_hydration());
    }
}
