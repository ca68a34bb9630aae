//! Per-operation request options with documented defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::browser::PaperFormat;
use crate::cancellation::CancellationToken;
use crate::utils::constants::{
    DEFAULT_PDF_MARGIN_PX, DEFAULT_SCREENSHOT_HEIGHT, DEFAULT_SCREENSHOT_SCALE,
    DEFAULT_SCREENSHOT_WIDTH,
};

/// Options for [`super::RenderEngine::extract`].
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Navigation budget; `None` uses the configured scrape budget (30s)
    pub render_timeout: Option<Duration>,
    /// Attach a viewport PNG to the result. Default: off
    pub allow_screenshot: bool,
    /// CSS injected after load, e.g. to hide overlays. Default: none
    pub style_injection: Option<String>,
    /// Wait (bounded by the selector timeout) for this selector. Default: none
    pub wait_for_selector: Option<String>,
    /// Scroll through the page to trigger lazy loading. Default: off
    pub scroll_to_bottom: bool,
    /// Fail with `NavigationTimeout` instead of returning partial content.
    /// Default: off
    pub fail_on_navigation_timeout: bool,
    /// Include the rendered HTML in the result (always included for the
    /// `html` representation). Default: off
    pub include_raw_html: bool,
    /// External cancellation, e.g. client disconnect
    pub cancel: Option<CancellationToken>,
}

/// Options for [`super::RenderEngine::render_pdf`].
#[derive(Debug, Clone)]
pub struct PdfOptions {
    /// Default: A4
    pub paper: PaperFormat,
    /// Default: on
    pub print_background: bool,
    /// Uniform margin in CSS pixels. Default: 20
    pub margin_px: u32,
    /// Default: off
    pub landscape: bool,
    pub render_timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            paper: PaperFormat::A4,
            print_background: true,
            margin_px: DEFAULT_PDF_MARGIN_PX,
            landscape: false,
            render_timeout: None,
            cancel: None,
        }
    }
}

/// Options for [`super::RenderEngine::capture_screenshot`].
#[derive(Debug, Clone)]
pub struct ScreenshotOptions {
    /// Default: 1280
    pub width: u32,
    /// Default: 720
    pub height: u32,
    /// Default: 2.0
    pub device_scale_factor: f64,
    /// Capture the whole scrollable page. Default: off
    pub full_page: bool,
    pub render_timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_SCREENSHOT_WIDTH,
            height: DEFAULT_SCREENSHOT_HEIGHT,
            device_scale_factor: DEFAULT_SCREENSHOT_SCALE,
            full_page: false,
            render_timeout: None,
            cancel: None,
        }
    }
}

/// Binary output of the PDF and screenshot operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDocument {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
