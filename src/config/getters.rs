//! Getter methods for `EngineConfig`

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::{Budget, Endpoint, EndpointBudgets, EngineConfig, ExecutionMode, ViewportConfig};

impl EngineConfig {
    #[must_use]
    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn chrome_executable(&self) -> Option<&Path> {
        self.chrome_executable.as_deref()
    }

    /// Directory under which per-launch browser profiles are created
    #[must_use]
    pub fn profile_root(&self) -> PathBuf {
        self.profile_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Whether the sandbox-disabling launch flags are applied
    #[must_use]
    pub fn no_sandbox(&self) -> bool {
        self.no_sandbox || self.execution_mode == ExecutionMode::Hosted
    }

    #[must_use]
    pub fn allow_browser_download(&self) -> bool {
        self.allow_browser_download
    }

    #[must_use]
    pub fn target_allowlist(&self) -> &[String] {
        &self.target_allowlist
    }

    #[must_use]
    pub fn budgets(&self) -> &EndpointBudgets {
        &self.budgets
    }

    #[must_use]
    pub fn budget(&self, endpoint: Endpoint) -> Budget {
        self.budgets.get(endpoint)
    }

    #[must_use]
    pub fn launch_timeout(&self) -> Duration {
        self.launch_timeout
    }

    #[must_use]
    pub fn selector_timeout(&self) -> Duration {
        self.selector_timeout
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    #[must_use]
    pub fn network_idle_window(&self) -> Duration {
        self.network_idle_window
    }

    #[must_use]
    pub fn viewport(&self) -> ViewportConfig {
        self.viewport
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn stealth(&self) -> bool {
        self.stealth
    }

    #[must_use]
    pub fn block_trackers(&self) -> bool {
        self.block_trackers
    }

    #[must_use]
    pub fn thin_content_threshold(&self) -> usize {
        self.thin_content_threshold
    }
}
