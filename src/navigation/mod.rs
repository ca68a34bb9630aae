//! Navigation strategy tolerant of partial failure.
//!
//! [`navigate`] sets a (possibly jittered) viewport, navigates to a validated
//! target and waits for the page to become mostly idle under a hard timeout.
//! Hitting the timeout is not a failure by default: the DOM that exists is
//! used and the outcome is flagged [`NavigationOutcome::TimedOutPartial`].
//! The optional post-navigation steps are each best-effort, and so is the
//! stealth setup that precedes `goto`.

pub mod idle;
pub mod scripts;
pub mod stealth;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::browser::Viewport;
use crate::cancellation::with_step_timeout;
use crate::error::{EngineError, EngineResult};
use crate::metrics::{MetricEvent, MetricsEmitter, Phase};
use crate::network_policy::TargetDescriptor;
use crate::session::SessionPage;

pub use idle::{IdleSettings, wait_for_network_idle};

/// Upper bound on scroll steps so infinite feeds terminate.
const MAX_SCROLL_STEPS: usize = 40;
const SCROLL_STEP_DELAY: Duration = Duration::from_millis(100);
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationOutcome {
    Loaded,
    TimedOutPartial,
}

/// Everything [`navigate`] needs to know, resolved from config and request
/// options.
#[derive(Debug, Clone)]
pub struct NavigationPlan {
    pub viewport: Viewport,
    /// Maximum +/- pixels applied independently to width and height
    pub jitter: u32,
    pub user_agent: Option<String>,
    /// Install [`stealth::EVASION_SCRIPT`] before navigating
    pub stealth: bool,
    /// Block [`stealth::TRACKER_URL_PATTERNS`] before navigating
    pub block_trackers: bool,
    /// Hard bound on navigation plus the idle wait
    pub hard_timeout: Duration,
    pub idle: IdleSettings,
    /// Turn a hard timeout into `NavigationTimeout` instead of a partial result
    pub fail_on_timeout: bool,
    pub wait_for_selector: Option<String>,
    pub selector_timeout: Duration,
    pub style_injection: Option<String>,
    pub scroll_to_bottom: bool,
    pub settle_delay: Duration,
}

impl NavigationPlan {
    #[must_use]
    pub fn new(viewport: Viewport, hard_timeout: Duration) -> Self {
        Self {
            viewport,
            jitter: 0,
            user_agent: None,
            stealth: false,
            block_trackers: false,
            hard_timeout,
            idle: IdleSettings::default(),
            fail_on_timeout: false,
            wait_for_selector: None,
            selector_timeout: Duration::from_secs(5),
            style_injection: None,
            scroll_to_bottom: false,
            settle_delay: Duration::ZERO,
        }
    }
}

/// Apply +/- `jitter` pixels to each dimension.
#[must_use]
pub fn jittered_viewport(base: Viewport, jitter: u32) -> Viewport {
    if jitter == 0 {
        return base;
    }
    let mut rng = rand::rng();
    let spread = i64::from(jitter);
    let width = i64::from(base.width) + rng.random_range(-spread..=spread);
    let height = i64::from(base.height) + rng.random_range(-spread..=spread);
    Viewport {
        width: u32::try_from(width.max(1)).unwrap_or(base.width),
        height: u32::try_from(height.max(1)).unwrap_or(base.height),
        device_scale_factor: base.device_scale_factor,
    }
}

/// Navigate `page` to `target` according to `plan`.
///
/// # Errors
///
/// - [`EngineError::NavigationFailed`] for transport failures (DNS, refused
///   connection, `net::ERR_*`)
/// - [`EngineError::NavigationTimeout`] when the hard timeout elapses and
///   `plan.fail_on_timeout` is set
/// - [`EngineError::Cancelled`] when the session token fires
pub async fn navigate(
    page: &SessionPage,
    target: TargetDescriptor,
    plan: &NavigationPlan,
    metrics: &MetricsEmitter,
) -> EngineResult<NavigationOutcome> {
    let started = Instant::now();
    let result = load(page, target, plan).await;

    match &result {
        Ok(NavigationOutcome::Loaded) => {
            metrics.emit(MetricEvent::success(Phase::Navigation, started.elapsed()));
        }
        Ok(NavigationOutcome::TimedOutPartial) => {
            metrics.emit(MetricEvent::failure(
                Phase::Navigation,
                started.elapsed(),
                "timed_out_partial",
            ));
        }
        Err(error) => {
            metrics.emit(MetricEvent::failure(
                Phase::Navigation,
                started.elapsed(),
                error.failure_mode(),
            ));
        }
    }

    let outcome = result?;
    run_post_navigation_steps(page, plan).await?;
    Ok(outcome)
}

async fn load(
    page: &SessionPage,
    target: TargetDescriptor,
    plan: &NavigationPlan,
) -> EngineResult<NavigationOutcome> {
    let viewport = jittered_viewport(plan.viewport, plan.jitter);
    page.set_viewport(viewport).await?;
    if let Some(user_agent) = &plan.user_agent {
        page.set_user_agent(user_agent).await?;
    }
    prepare_page(page, plan).await?;

    let url = target.into_url();
    let started = Instant::now();
    debug!(url = %url, width = viewport.width, height = viewport.height, "Navigating");

    let settle = async {
        page.goto(url.as_str()).await?;
        wait_for_network_idle(page, &plan.idle).await
    };

    let timed_out = match tokio::time::timeout(plan.hard_timeout, settle).await {
        Ok(Ok(())) => false,
        Ok(Err(EngineError::NavigationTimeout { .. })) | Err(_) => true,
        Ok(Err(error)) => return Err(error),
    };

    if !timed_out {
        info!(url = %url, elapsed_ms = started.elapsed().as_millis() as u64, "Page loaded");
        return Ok(NavigationOutcome::Loaded);
    }

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    if plan.fail_on_timeout {
        return Err(EngineError::NavigationTimeout { elapsed_ms });
    }
    warn!(url = %url, elapsed_ms, "Navigation did not settle in time, continuing with partial DOM");
    Ok(NavigationOutcome::TimedOutPartial)
}

async fn prepare_page(page: &SessionPage, plan: &NavigationPlan) -> EngineResult<()> {
    if plan.stealth {
        let installed = page
            .add_init_script(stealth::EVASION_SCRIPT)
            .await
            .map_err(anyhow::Error::new);
        best_effort(page, "stealth", installed)?;
    }
    if plan.block_trackers {
        let blocked = page
            .block_urls(&stealth::tracker_patterns())
            .await
            .map_err(anyhow::Error::new);
        best_effort(page, "block_trackers", blocked)?;
    }
    Ok(())
}

/// Optional steps; each swallows its own failure, only cancellation aborts.
async fn run_post_navigation_steps(page: &SessionPage, plan: &NavigationPlan) -> EngineResult<()> {
    if let Some(selector) = &plan.wait_for_selector {
        let waited = with_step_timeout(
            wait_for_selector(page, selector),
            plan.selector_timeout.min(page.remaining()),
            "wait for selector",
        )
        .await;
        best_effort(page, "wait_for_selector", waited)?;
    }

    if let Some(css) = &plan.style_injection {
        let injected = page
            .evaluate(&scripts::style_injection(css))
            .await
            .map(|_| ())
            .map_err(anyhow::Error::new);
        best_effort(page, "style_injection", injected)?;
    }

    if plan.scroll_to_bottom {
        let scrolled = with_step_timeout(
            scroll_to_bottom(page),
            page.remaining(),
            "scroll to bottom",
        )
        .await;
        best_effort(page, "scroll_to_bottom", scrolled)?;
    }

    if !plan.settle_delay.is_zero() {
        page.sleep(plan.settle_delay).await?;
    }

    Ok(())
}

/// Log and discard a step failure unless the session was cancelled.
fn best_effort(page: &SessionPage, step: &str, result: anyhow::Result<()>) -> EngineResult<()> {
    if let Err(e) = result {
        if let Some(reason) = page.token().reason() {
            return Err(EngineError::Cancelled(reason));
        }
        debug!(step, "Best-effort navigation step skipped: {e:#}");
    }
    Ok(())
}

async fn wait_for_selector(page: &SessionPage, selector: &str) -> anyhow::Result<()> {
    let probe = scripts::selector_probe(selector);
    loop {
        if page.evaluate(&probe).await?.as_bool() == Some(true) {
            return Ok(());
        }
        page.sleep(SELECTOR_POLL_INTERVAL).await?;
    }
}

async fn scroll_to_bottom(page: &SessionPage) -> anyhow::Result<()> {
    for _ in 0..MAX_SCROLL_STEPS {
        let step = page.evaluate(scripts::SCROLL_STEP_SCRIPT).await?;
        let at_bottom = step.get("bottom").and_then(serde_json::Value::as_bool) == Some(true);
        let moved = step.get("moved").and_then(serde_json::Value::as_bool) == Some(true);
        if at_bottom || !moved {
            break;
        }
        page.sleep(SCROLL_STEP_DELAY).await?;
    }
    page.evaluate(scripts::SCROLL_RESET_SCRIPT).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_jitter_keeps_viewport() {
        let base = Viewport::new(1920, 1080);
        assert_eq!(jittered_viewport(base, 0), base);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Viewport::new(1920, 1080);
        for _ in 0..200 {
            let v = jittered_viewport(base, 50);
            assert!((1870..=1970).contains(&v.width));
            assert!((1030..=1130).contains(&v.height));
        }
    }
}
