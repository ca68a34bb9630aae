//! Fluent builder for `EngineConfig`
//!
//! Every field has a documented default, so `EngineConfig::builder().build()`
//! is a valid local configuration. `build()` validates budgets and normalizes
//! the allowlist.

use anyhow::{Result, anyhow};
use std::path::PathBuf;
use std::time::Duration;

use super::types::{
    Budget, Endpoint, EndpointBudgets, EngineConfig, ExecutionMode, ViewportConfig,
};
use crate::utils::constants::{
    CHROME_USER_AGENT, DEFAULT_LAUNCH_TIMEOUT, DEFAULT_NETWORK_IDLE_WINDOW,
    DEFAULT_RENDER_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SELECTOR_TIMEOUT,
    DEFAULT_SETTLE_DELAY, DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_JITTER,
    DEFAULT_VIEWPORT_WIDTH, TARGET_ALLOWLIST_ENV, THIN_CONTENT_THRESHOLD,
};

#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    pub(crate) execution_mode: ExecutionMode,
    pub(crate) headless: bool,
    pub(crate) chrome_executable: Option<PathBuf>,
    pub(crate) profile_root: Option<PathBuf>,
    pub(crate) no_sandbox: bool,
    pub(crate) allow_browser_download: bool,
    pub(crate) target_allowlist: Vec<String>,
    pub(crate) budgets: EndpointBudgets,
    pub(crate) launch_timeout: Duration,
    pub(crate) selector_timeout: Duration,
    pub(crate) settle_delay: Duration,
    pub(crate) network_idle_window: Duration,
    pub(crate) viewport: ViewportConfig,
    pub(crate) viewport_jitter: Option<u32>,
    pub(crate) user_agent: String,
    pub(crate) stealth: bool,
    pub(crate) block_trackers: bool,
    pub(crate) thin_content_threshold: usize,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        let budget = Budget::new(DEFAULT_RENDER_TIMEOUT, DEFAULT_REQUEST_TIMEOUT);
        Self {
            execution_mode: ExecutionMode::Local,
            headless: true,
            chrome_executable: None,
            profile_root: None,
            no_sandbox: false,
            allow_browser_download: true,
            target_allowlist: Vec::new(),
            budgets: EndpointBudgets {
                scrape: budget,
                pdf: budget,
                shot: budget,
            },
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            selector_timeout: DEFAULT_SELECTOR_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            network_idle_window: DEFAULT_NETWORK_IDLE_WINDOW,
            viewport: ViewportConfig {
                width: DEFAULT_VIEWPORT_WIDTH,
                height: DEFAULT_VIEWPORT_HEIGHT,
                jitter: 0,
            },
            viewport_jitter: None,
            user_agent: CHROME_USER_AGENT.to_string(),
            stealth: true,
            block_trackers: true,
            thin_content_threshold: THIN_CONTENT_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Create a builder for configuring an `EngineConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Build a configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an unparseable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup (the environment in
    /// production, a map in tests).
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an unparseable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::builder().apply_env(lookup)?.build()
    }
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_executable = Some(path.into());
        self
    }

    #[must_use]
    pub fn profile_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_root = Some(dir.into());
        self
    }

    #[must_use]
    pub fn no_sandbox(mut self, no_sandbox: bool) -> Self {
        self.no_sandbox = no_sandbox;
        self
    }

    #[must_use]
    pub fn allow_browser_download(mut self, allow: bool) -> Self {
        self.allow_browser_download = allow;
        self
    }

    #[must_use]
    pub fn target_allowlist<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_allowlist = hosts.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn budget(mut self, endpoint: Endpoint, budget: Budget) -> Self {
        *self.budgets.get_mut(endpoint) = budget;
        self
    }

    #[must_use]
    pub fn render_timeout(mut self, endpoint: Endpoint, timeout: Duration) -> Self {
        self.budgets.get_mut(endpoint).render_timeout = timeout;
        self
    }

    #[must_use]
    pub fn launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn selector_timeout(mut self, timeout: Duration) -> Self {
        self.selector_timeout = timeout;
        self
    }

    #[must_use]
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    #[must_use]
    pub fn network_idle_window(mut self, window: Duration) -> Self {
        self.network_idle_window = window;
        self
    }

    #[must_use]
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport.width = width;
        self.viewport.height = height;
        self
    }

    /// Maximum +/- pixel jitter. Defaults to 0 locally and 50 in hosted mode.
    #[must_use]
    pub fn viewport_jitter(mut self, jitter: u32) -> Self {
        self.viewport_jitter = Some(jitter);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn stealth(mut self, enabled: bool) -> Self {
        self.stealth = enabled;
        self
    }

    #[must_use]
    pub fn block_trackers(mut self, enabled: bool) -> Self {
        self.block_trackers = enabled;
        self
    }

    #[must_use]
    pub fn thin_content_threshold(mut self, chars: usize) -> Self {
        self.thin_content_threshold = chars;
        self
    }

    /// Overlay environment settings.
    ///
    /// | Variable | Effect |
    /// |---|---|
    /// | `BROWSER_TARGET_ALLOWLIST` | comma-separated hostnames |
    /// | `RENDER_EXECUTION_MODE` | `local` or `hosted` (else `NODE_ENV=production` means hosted) |
    /// | `CHROMIUM_PATH` | browser executable |
    /// | `RENDER_HEADLESS` | `true`/`false` |
    /// | `RENDER_PROFILE_DIR` | parent of per-launch profiles |
    /// | `RENDER_STEALTH` | `true`/`false` |
    /// | `RENDER_BLOCK_TRACKERS` | `true`/`false` |
    /// | `RENDER_TIMEOUT_{SCRAPE,PDF,SHOT}_MS` | render timeout per endpoint |
    ///
    /// A render timeout that exceeds the endpoint's request timeout raises the
    /// request timeout to twice the render timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an unparseable value.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(list) = lookup(TARGET_ALLOWLIST_ENV) {
            self.target_allowlist = list
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(mode) = lookup("RENDER_EXECUTION_MODE") {
            self.execution_mode = mode.parse()?;
        } else if lookup("NODE_ENV").is_some_and(|env| env.eq_ignore_ascii_case("production")) {
            self.execution_mode = ExecutionMode::Hosted;
        }

        if let Some(path) = lookup("CHROMIUM_PATH").filter(|p| !p.trim().is_empty()) {
            self.chrome_executable = Some(PathBuf::from(path));
        }

        if let Some(value) = lookup("RENDER_HEADLESS") {
            self.headless = parse_bool(&value)
                .ok_or_else(|| anyhow!("RENDER_HEADLESS must be true or false, got '{value}'"))?;
        }

        if let Some(value) = lookup("RENDER_STEALTH") {
            self.stealth = parse_bool(&value)
                .ok_or_else(|| anyhow!("RENDER_STEALTH must be true or false, got '{value}'"))?;
        }

        if let Some(value) = lookup("RENDER_BLOCK_TRACKERS") {
            self.block_trackers = parse_bool(&value).ok_or_else(|| {
                anyhow!("RENDER_BLOCK_TRACKERS must be true or false, got '{value}'")
            })?;
        }

        if let Some(dir) = lookup("RENDER_PROFILE_DIR").filter(|d| !d.trim().is_empty()) {
            self.profile_root = Some(PathBuf::from(dir));
        }

        for endpoint in [Endpoint::Scrape, Endpoint::Pdf, Endpoint::Shot] {
            let key = format!("RENDER_TIMEOUT_{}_MS", endpoint.as_str().to_ascii_uppercase());
            if let Some(raw) = lookup(&key) {
                let millis: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|e| anyhow!("{key} must be a number of milliseconds: {e}"))?;
                let budget = self.budgets.get_mut(endpoint);
                budget.render_timeout = Duration::from_millis(millis);
                if budget.request_timeout < budget.render_timeout {
                    budget.request_timeout = budget.render_timeout * 2;
                }
            }
        }

        Ok(self)
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout is zero, a render timeout exceeds its
    /// request timeout, or an allowlist entry is not a plain hostname.
    pub fn build(self) -> Result<EngineConfig> {
        for endpoint in [Endpoint::Scrape, Endpoint::Pdf, Endpoint::Shot] {
            let budget = self.budgets.get(endpoint);
            if budget.render_timeout.is_zero() {
                return Err(anyhow!(
                    "render timeout for '{}' must be greater than zero",
                    endpoint.as_str()
                ));
            }
            if budget.request_timeout < budget.render_timeout {
                return Err(anyhow!(
                    "request timeout for '{}' ({}ms) is shorter than its render timeout ({}ms)",
                    endpoint.as_str(),
                    budget.request_timeout.as_millis(),
                    budget.render_timeout.as_millis()
                ));
            }
        }

        if self.launch_timeout.is_zero() {
            return Err(anyhow!("launch timeout must be greater than zero"));
        }

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(anyhow!("viewport dimensions must be non-zero"));
        }

        let target_allowlist = self
            .target_allowlist
            .iter()
            .map(|entry| normalize_allowlist_entry(entry))
            .collect::<Result<Vec<_>>>()?;

        let jitter = self.viewport_jitter.unwrap_or(match self.execution_mode {
            ExecutionMode::Local => 0,
            ExecutionMode::Hosted => DEFAULT_VIEWPORT_JITTER,
        });
        if jitter >= self.viewport.width.min(self.viewport.height) {
            return Err(anyhow!(
                "viewport jitter ({jitter}px) must be smaller than the viewport"
            ));
        }

        Ok(EngineConfig {
            execution_mode: self.execution_mode,
            headless: self.headless,
            chrome_executable: self.chrome_executable,
            profile_root: self.profile_root,
            no_sandbox: self.no_sandbox,
            allow_browser_download: self.allow_browser_download,
            target_allowlist,
            budgets: self.budgets,
            launch_timeout: self.launch_timeout,
            selector_timeout: self.selector_timeout,
            settle_delay: self.settle_delay,
            network_idle_window: self.network_idle_window,
            viewport: ViewportConfig {
                jitter,
                ..self.viewport
            },
            user_agent: self.user_agent,
            stealth: self.stealth,
            block_trackers: self.block_trackers,
            thin_content_threshold: self.thin_content_threshold,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Lower-case, strip a leading `*.` or `.`, and reject anything that is not a
/// bare hostname.
fn normalize_allowlist_entry(entry: &str) -> Result<String> {
    let trimmed = entry.trim().trim_end_matches('.').to_ascii_lowercase();
    let host = trimmed
        .strip_prefix("*.")
        .or_else(|| trimmed.strip_prefix('.'))
        .unwrap_or(&trimmed);

    if host.is_empty() || host.contains(['/', ':', '@', ' ', '*']) {
        return Err(anyhow!("Invalid allowlist entry '{entry}': expected a bare hostname"));
    }

    Ok(host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_a_local_config() -> Result<()> {
        let config = EngineConfig::builder().build()?;
        assert_eq!(config.execution_mode(), ExecutionMode::Local);
        assert!(config.headless());
        assert!(!config.no_sandbox());
        assert_eq!(config.viewport().jitter, 0);
        assert_eq!(config.budget(Endpoint::Scrape).render_timeout, DEFAULT_RENDER_TIMEOUT);
        Ok(())
    }

    #[test]
    fn hosted_mode_enables_jitter_and_disables_sandbox() -> Result<()> {
        let config = EngineConfig::builder()
            .execution_mode(ExecutionMode::Hosted)
            .build()?;
        assert_eq!(config.viewport().jitter, DEFAULT_VIEWPORT_JITTER);
        assert!(config.no_sandbox());
        Ok(())
    }

    #[test]
    fn rejects_render_timeout_longer_than_request_timeout() {
        let result = EngineConfig::builder()
            .budget(
                Endpoint::Pdf,
                Budget::new(Duration::from_secs(90), Duration::from_secs(60)),
            )
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn normalizes_allowlist_entries() -> Result<()> {
        let config = EngineConfig::builder()
            .target_allowlist(["Example.COM", "*.docs.rs", ".news.example.org."])
            .build()?;
        assert_eq!(
            config.target_allowlist(),
            ["example.com", "docs.rs", "news.example.org"]
        );
        Ok(())
    }

    #[test]
    fn rejects_urls_in_allowlist() {
        let result = EngineConfig::builder()
            .target_allowlist(["https://example.com/path"])
            .build();
        assert!(result.is_err());
    }
}
