//! Merge readability output, hidden state and meta into one result.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

use super::{ReadableContent, Representation};
use crate::navigation::NavigationOutcome;
use crate::page_extractor::{HiddenState, PageMetadata};

const UNTITLED: &str = "Untitled";
const DEFAULT_PAGE_TYPE: &str = "website";

/// Quality signals recorded alongside the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSignals {
    /// Visible text is short while structured data or hydration state exists
    pub thin_content: bool,
    pub navigation: NavigationOutcome,
    /// Characters of plain text in the extracted content
    pub text_length: usize,
}

/// Normalized output of one extraction job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub title: String,
    pub content: String,
    pub representation: Representation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    pub metadata: PageMetadata,
    pub structured_data: Vec<Value>,
    pub hydration_state: BTreeMap<String, Value>,
    pub outgoing_links: Vec<String>,
    pub signals: ContentSignals,
    /// PNG, base64 encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub url: String,
    pub extracted_at: DateTime<Utc>,
}

/// Everything [`merge`] combines.
#[derive(Debug)]
pub struct MergeInput<'a> {
    pub url: &'a Url,
    pub readable: &'a ReadableContent,
    pub hidden: HiddenState,
    /// `readable` already converted to `representation`
    pub content: String,
    pub representation: Representation,
    pub navigation: NavigationOutcome,
    pub raw_html: Option<String>,
    pub screenshot: Option<Vec<u8>>,
    pub thin_content_threshold: usize,
}

/// Build the final result. Sources are never substituted for one another:
/// short content stays short and is only flagged.
#[must_use]
pub fn merge(input: MergeInput<'_>) -> ExtractionResult {
    let MergeInput {
        url,
        readable,
        hidden,
        content,
        representation,
        navigation,
        raw_html,
        screenshot,
        thin_content_threshold,
    } = input;

    let text_length = readable.text_length();
    let thin_content = text_length < thin_content_threshold
        && (hidden.has_structured_data() || hidden.has_hydration());

    let title = non_empty(readable.title.as_deref())
        .or_else(|| non_empty(hidden.metadata.title.as_deref()))
        .unwrap_or(UNTITLED)
        .to_string();

    let mut metadata = hidden.metadata;
    if let Some(byline) = non_empty(readable.byline.as_deref()) {
        metadata.author = Some(byline.to_string());
    }
    if let Some(excerpt) = non_empty(readable.excerpt.as_deref()) {
        metadata.description = Some(excerpt.to_string());
    }
    if metadata.page_type.is_none() {
        metadata.page_type = Some(DEFAULT_PAGE_TYPE.to_string());
    }

    ExtractionResult {
        title,
        content,
        representation,
        raw_html,
        metadata,
        structured_data: hidden.structured_data,
        hydration_state: hidden.hydration,
        outgoing_links: hidden.outgoing_links,
        signals: ContentSignals {
            thin_content,
            navigation,
            text_length,
        },
        screenshot: screenshot.map(|png| BASE64.encode(png)),
        url: url.to_string(),
        extracted_at: Utc::now(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
