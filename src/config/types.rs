//! Core configuration types for the rendering engine
//!
//! `EngineConfig` holds every process-wide setting: how the shared browser is
//! launched, which navigation targets are allowed, and the time budgets of
//! each endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where the engine runs, which selects the browser launch flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Developer machine: regular Chrome profile flags, sandbox kept unless disabled
    #[default]
    Local,
    /// Container or serverless host: sandbox-less, shared-memory-safe flags
    Hosted,
}

impl FromStr for ExecutionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "development" | "dev" => Ok(Self::Local),
            "hosted" | "production" | "prod" | "serverless" => Ok(Self::Hosted),
            other => Err(anyhow::anyhow!("Unknown execution mode '{other}'")),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Hosted => f.write_str("hosted"),
        }
    }
}

/// The three browser-backed operations, each with its own time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Scrape,
    Pdf,
    Shot,
}

impl Endpoint {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::Pdf => "pdf",
            Self::Shot => "shot",
        }
    }
}

/// Time budget of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    /// Hard bound on navigation + network-idle wait; exceeding it yields a
    /// partial result rather than a failure
    pub render_timeout: Duration,
    /// Outer bound on the whole request; exceeding it cancels the job
    pub request_timeout: Duration,
}

impl Budget {
    #[must_use]
    pub const fn new(render_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            render_timeout,
            request_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointBudgets {
    pub scrape: Budget,
    pub pdf: Budget,
    pub shot: Budget,
}

impl EndpointBudgets {
    #[must_use]
    pub const fn get(&self, endpoint: Endpoint) -> Budget {
        match endpoint {
            Endpoint::Scrape => self.scrape,
            Endpoint::Pdf => self.pdf,
            Endpoint::Shot => self.shot,
        }
    }

    pub(crate) fn get_mut(&mut self, endpoint: Endpoint) -> &mut Budget {
        match endpoint {
            Endpoint::Scrape => &mut self.scrape,
            Endpoint::Pdf => &mut self.pdf,
            Endpoint::Shot => &mut self.shot,
        }
    }
}

/// Base viewport plus the maximum random offset applied per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
    pub jitter: u32,
}

/// Main configuration struct for the rendering engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub(crate) execution_mode: ExecutionMode,
    pub(crate) headless: bool,
    /// Explicit browser binary; when unset the platform search paths are tried
    pub(crate) chrome_executable: Option<PathBuf>,
    /// Parent directory for per-launch profile directories
    ///
    /// Default: the OS temp directory
    pub(crate) profile_root: Option<PathBuf>,
    /// Force `--no-sandbox` in local mode (hosted mode always disables it)
    pub(crate) no_sandbox: bool,
    /// Download a managed Chromium when no local browser is found
    pub(crate) allow_browser_download: bool,

    /// Lower-cased hostnames; navigation is restricted to these and their
    /// subdomains when non-empty
    pub(crate) target_allowlist: Vec<String>,

    pub(crate) budgets: EndpointBudgets,

    /// Upper bound on a cold browser launch
    ///
    /// Default: 30 seconds
    pub(crate) launch_timeout: Duration,

    /// Secondary timeout for the optional `wait_for_selector` step
    ///
    /// Default: 5 seconds
    pub(crate) selector_timeout: Duration,

    /// Fixed delay after the optional post-navigation steps
    ///
    /// Default: 500 milliseconds
    pub(crate) settle_delay: Duration,

    /// How long the resource count must stay stable to count as idle
    ///
    /// Default: 500 milliseconds
    pub(crate) network_idle_window: Duration,

    pub(crate) viewport: ViewportConfig,
    pub(crate) user_agent: String,

    /// Install the navigator evasions before every navigation
    ///
    /// Default: true
    pub(crate) stealth: bool,

    /// Refuse requests to known ad and tracker hosts
    ///
    /// Default: true
    pub(crate) block_trackers: bool,

    /// Character count below which extracted content is flagged as thin
    pub(crate) thin_content_threshold: usize,
}
