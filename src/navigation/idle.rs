//! "Mostly network-idle" heuristic.
//!
//! The page counts as settled once the document is at least interactive and
//! no more than `max_inflight` new resource entries appeared during a full
//! quiet window. Long-polling and analytics beacons therefore never block a
//! render forever; the caller's hard timeout bounds the wait in any case.

use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use super::scripts::IDLE_PROBE_SCRIPT;
use crate::error::EngineResult;
use crate::session::SessionPage;
use crate::utils::constants::{DEFAULT_NETWORK_IDLE_WINDOW, NETWORK_IDLE_MAX_INFLIGHT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSettings {
    pub quiet_window: Duration,
    pub poll_interval: Duration,
    pub max_inflight: u32,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            quiet_window: DEFAULT_NETWORK_IDLE_WINDOW,
            poll_interval: Duration::from_millis(100),
            max_inflight: NETWORK_IDLE_MAX_INFLIGHT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct IdleProbe {
    #[serde(default)]
    ready: String,
    #[serde(default)]
    resources: u64,
}

impl IdleProbe {
    fn is_ready(&self) -> bool {
        matches!(self.ready.as_str(), "interactive" | "complete")
    }
}

/// Poll until the page is mostly idle. Runs until settled; bound it with a
/// timeout.
///
/// # Errors
///
/// Only [`crate::EngineError::Cancelled`]; probe failures (for example while
/// the execution context is being replaced) are treated as "not idle yet".
pub async fn wait_for_network_idle(page: &SessionPage, settings: &IdleSettings) -> EngineResult<()> {
    let mut window_start = Instant::now();
    let mut window_baseline: Option<u64> = None;

    loop {
        match page.evaluate(IDLE_PROBE_SCRIPT).await {
            Ok(value) => {
                let probe: IdleProbe = serde_json::from_value(value).unwrap_or_default();

                if !probe.is_ready() {
                    window_baseline = None;
                } else {
                    match window_baseline {
                        None => {
                            window_baseline = Some(probe.resources);
                            window_start = Instant::now();
                        }
                        Some(baseline)
                            if probe.resources.saturating_sub(baseline)
                                > u64::from(settings.max_inflight) =>
                        {
                            trace!(
                                resources = probe.resources,
                                baseline,
                                "Network activity inside idle window, restarting window"
                            );
                            window_baseline = Some(probe.resources);
                            window_start = Instant::now();
                        }
                        Some(_) if window_start.elapsed() >= settings.quiet_window => {
                            trace!(resources = probe.resources, "Page reached network idle");
                            return Ok(());
                        }
                        Some(_) => {}
                    }
                }
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                trace!("Idle probe failed, retrying: {e}");
                window_baseline = None;
            }
        }

        page.sleep(settings.poll_interval).await?;
    }
}
