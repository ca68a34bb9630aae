//! Seams between the engine and the browser automation backend.
//!
//! Production uses the chromiumoxide-backed implementations in
//! [`super::chromium`]; tests plug in in-memory doubles.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Starts a browser process.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserEngine>>;
}

/// A running browser process.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Cheap round-trip proving the process is still responsive
    async fn health_check(&self) -> Result<()>;

    /// Create an isolated context (no shared cookies or storage).
    async fn new_context(&self) -> Result<Box<dyn BrowserContext>>;

    /// Close the process and release its profile directory.
    async fn shutdown(&self) -> Result<()>;
}

/// An isolated browsing context inside the shared process.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    fn id(&self) -> &str;

    async fn new_page(&self) -> Result<Arc<dyn PageDriver>>;

    /// Dispose the context together with every page it owns.
    async fn close(&self) -> Result<()>;
}

/// Primitive page operations; everything higher-level is composed from these.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn set_viewport(&self, viewport: Viewport) -> Result<()>;

    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;

    /// Evaluate `source` in every frame upon creation, before the frame's
    /// own scripts run.
    async fn add_init_script(&self, source: &str) -> Result<()>;

    /// Block requests whose URL matches any pattern (`*` is a wildcard).
    async fn block_urls(&self, patterns: &[String]) -> Result<()>;

    /// Navigate and wait for the load event.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Evaluate a JavaScript expression and return its JSON value
    /// (`null` when the expression yields `undefined`).
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String>;

    /// PNG bytes.
    async fn screenshot(&self, options: CaptureOptions) -> Result<Vec<u8>>;

    /// PDF bytes.
    async fn pdf(&self, options: PrintOptions) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl Viewport {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            device_scale_factor: 1.0,
        }
    }

    #[must_use]
    pub const fn with_scale(mut self, device_scale_factor: f64) -> Self {
        self.device_scale_factor = device_scale_factor;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOptions {
    pub full_page: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperFormat {
    #[default]
    A4,
    A3,
    Letter,
    Legal,
}

impl PaperFormat {
    /// Paper size in inches (width, height), portrait.
    #[must_use]
    pub const fn inches(&self) -> (f64, f64) {
        match self {
            Self::A4 => (8.27, 11.7),
            Self::A3 => (11.7, 16.54),
            Self::Letter => (8.5, 11.0),
            Self::Legal => (8.5, 14.0),
        }
    }
}

impl std::str::FromStr for PaperFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a4" => Ok(Self::A4),
            "a3" => Ok(Self::A3),
            "letter" => Ok(Self::Letter),
            "legal" => Ok(Self::Legal),
            other => Err(anyhow::anyhow!("Unsupported paper format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintOptions {
    pub paper: PaperFormat,
    pub landscape: bool,
    pub print_background: bool,
    /// Uniform margin in CSS pixels (96 per inch)
    pub margin_px: u32,
}
