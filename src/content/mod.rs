//! Offline content processing: readability extraction, conversion into the
//! requested representation, and the final merge into an [`ExtractionResult`].

pub mod convert;
pub mod dom;
pub mod merge;
pub mod readability;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use convert::{convert, html_to_markdown, html_to_text};
pub use merge::{ContentSignals, ExtractionResult, MergeInput, merge};
pub use readability::extract_content;

/// Output form of the extracted content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    #[default]
    Markdown,
    Text,
    Html,
}

impl Representation {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::Html => "html",
        }
    }
}

impl FromStr for Representation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "text" | "txt" | "plain" => Ok(Self::Text),
            "html" => Ok(Self::Html),
            other => Err(anyhow::anyhow!("Unknown representation '{other}'")),
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main content identified by [`extract_content`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadableContent {
    pub title: Option<String>,
    pub byline: Option<String>,
    pub excerpt: Option<String>,
    /// Cleaned fragment with links and media resolved against the page URL
    pub content_html: String,
    /// Plain text of `content_html`
    pub text_content: String,
}

impl ReadableContent {
    /// Length of the plain text in characters.
    #[must_use]
    pub fn text_length(&self) -> usize {
        self.text_content.chars().count()
    }
}
