//! Shared defaults for the rendering engine
//!
//! Default values used by the config builder and the navigation strategy,
//! kept in one place to avoid magic numbers.

use std::time::Duration;

/// Chrome user agent string applied to every page
///
/// Updated: 2025-01-29 to Chrome 132 (current stable)
///
/// Chrome releases new stable versions ~every 4 weeks.
/// Update quarterly to stay within reasonable version window.
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Render budget for a single navigation before partial results are used
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Outer request budget covering launch, navigation and extraction
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on a cold browser launch
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Secondary timeout for `wait_for_selector`
pub const DEFAULT_SELECTOR_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed delay after the optional post-navigation steps
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// The resource count must stay stable this long to count as network-idle
pub const DEFAULT_NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

/// Late requests tolerated inside one idle window ("mostly" idle)
pub const NETWORK_IDLE_MAX_INFLIGHT: u32 = 2;

/// Desktop viewport used for extraction and screenshots
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1920;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 1080;

/// Maximum +/- pixels of viewport jitter in hosted mode
pub const DEFAULT_VIEWPORT_JITTER: u32 = 50;

/// Print viewport used before rendering a PDF
pub const PDF_VIEWPORT_WIDTH: u32 = 1200;
pub const PDF_VIEWPORT_HEIGHT: u32 = 800;

/// Default page margin for PDF output, in CSS pixels
pub const DEFAULT_PDF_MARGIN_PX: u32 = 20;

/// Screenshot defaults
pub const DEFAULT_SCREENSHOT_WIDTH: u32 = 1280;
pub const DEFAULT_SCREENSHOT_HEIGHT: u32 = 720;
pub const DEFAULT_SCREENSHOT_SCALE: f64 = 2.0;

/// Content shorter than this (in characters) is flagged as thin when
/// structured data or hydration state exists
pub const THIN_CONTENT_THRESHOLD: usize = 200;

/// Environment variable holding the comma-separated navigation allowlist
pub const TARGET_ALLOWLIST_ENV: &str = "BROWSER_TARGET_ALLOWLIST";
