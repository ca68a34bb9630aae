//! Engine facade: the `extract`, `render_pdf` and `capture_screenshot`
//! operations over the validated, isolated and supervised pipeline.
//!
//! Every operation follows the same control flow: validate the URL (before
//! any browser resource exists), acquire a page session, navigate, produce
//! output inside the session, tear the session down.

pub mod options;
pub mod state;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::browser::{
    BrowserLauncher, CaptureOptions, ChromiumLauncher, ProcessManager, PrintOptions, Viewport,
};
use crate::cancellation::CancellationToken;
use crate::config::{Endpoint, EngineConfig};
use crate::content::{self, ExtractionResult, MergeInput, Representation};
use crate::error::{EngineError, EngineResult};
use crate::metrics::{MetricEvent, MetricsEmitter, MetricsSink, Phase, TracingSink};
use crate::navigation::{IdleSettings, NavigationOutcome, NavigationPlan, navigate};
use crate::network_policy::{NetworkPolicy, SystemResolver, TargetDescriptor, TargetResolver};
use crate::page_extractor::{extract_hidden_state, harvest_static};
use crate::session::{PageSession, SessionPage};
use crate::utils::constants::{PDF_VIEWPORT_HEIGHT, PDF_VIEWPORT_WIDTH};

pub use options::{ExtractOptions, PdfOptions, RenderedDocument, ScreenshotOptions};
pub use state::{JobState, JobTracker};

/// Managed rendering and extraction engine.
///
/// Cheap to share behind an `Arc`; all requests use one browser process,
/// each in its own isolated context.
pub struct RenderEngine {
    config: Arc<EngineConfig>,
    policy: NetworkPolicy,
    manager: ProcessManager,
    metrics: MetricsEmitter,
}

impl std::fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEngine")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl RenderEngine {
    /// Engine backed by a local Chrome/Chromium and the system resolver.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let launcher = Arc::new(ChromiumLauncher::new(Arc::clone(&config)));
        Self::assemble(config, launcher, Arc::new(SystemResolver), Arc::new(TracingSink))
    }

    /// Engine with caller-provided browser, resolver and metrics sink.
    #[must_use]
    pub fn with_components(
        config: EngineConfig,
        launcher: Arc<dyn BrowserLauncher>,
        resolver: Arc<dyn TargetResolver>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self::assemble(Arc::new(config), launcher, resolver, sink)
    }

    fn assemble(
        config: Arc<EngineConfig>,
        launcher: Arc<dyn BrowserLauncher>,
        resolver: Arc<dyn TargetResolver>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let metrics = MetricsEmitter::new(sink);
        let manager = ProcessManager::new(launcher, metrics.clone(), config.launch_timeout());
        let policy = NetworkPolicy::from_config(&config, resolver);
        Self {
            config,
            policy,
            manager,
            metrics,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &MetricsEmitter {
        &self.metrics
    }

    #[must_use]
    pub fn process_manager(&self) -> &ProcessManager {
        &self.manager
    }

    /// Render `url` and extract its content in `representation`.
    ///
    /// A navigation that does not settle within the render budget still
    /// produces a result, flagged `signals.navigation = timed_out_partial`,
    /// unless `fail_on_navigation_timeout` is set.
    ///
    /// # Errors
    ///
    /// Any [`EngineError`]; validation errors are returned before a browser
    /// is touched.
    pub async fn extract(
        &self,
        url: &str,
        representation: Representation,
        options: ExtractOptions,
    ) -> EngineResult<ExtractionResult> {
        let started = Instant::now();
        let tracker = Arc::new(JobTracker::new(uuid::Uuid::new_v4().to_string()));
        debug!(job = tracker.job_id(), url, %representation, "Extraction requested");

        let target = self.validate(url, &tracker, started).await?;
        let base_url = target.canonical_url().clone();
        let budget = self.config.budget(Endpoint::Scrape);
        let render_timeout = options.render_timeout.unwrap_or(budget.render_timeout);

        let viewport = self.config.viewport();
        let mut plan = self.navigation_plan(
            Viewport::new(viewport.width, viewport.height),
            render_timeout,
        );
        plan.jitter = viewport.jitter;
        plan.fail_on_timeout = options.fail_on_navigation_timeout;
        plan.wait_for_selector = options.wait_for_selector.clone();
        plan.style_injection = options.style_injection.clone();
        plan.scroll_to_bottom = options.scroll_to_bottom;

        let include_raw_html = options.include_raw_html || representation == Representation::Html;
        let allow_screenshot = options.allow_screenshot;
        let thin_content_threshold = self.config.thin_content_threshold();

        tracker.advance(JobState::Navigating);
        let session = self
            .acquire(budget.request_timeout.max(render_timeout), options.cancel.as_ref(), &tracker)
            .await?;

        let job = Arc::clone(&tracker);
        let result = session
            .run(move |page| async move {
                let target = self.revalidate(target).await?;
                let navigation = navigate(&page, target, &plan, &self.metrics).await?;
                advance_loaded(&job, navigation);

                let html = page.content().await?;
                let hidden = extract_hidden_state(&page, &base_url).await?;
                let screenshot = if allow_screenshot {
                    optional_screenshot(&page).await?
                } else {
                    None
                };

                let job_for_convert = Arc::clone(&job);
                tokio::task::spawn_blocking(move || -> EngineResult<ExtractionResult> {
                    let mut hidden = hidden;
                    hidden.fill_from(harvest_static(&html, &base_url));
                    let readable = content::extract_content(&html, &base_url)?;

                    job_for_convert.advance(JobState::Converting);
                    let converted = content::convert(&readable, representation)?;

                    Ok(content::merge(MergeInput {
                        url: &base_url,
                        readable: &readable,
                        hidden,
                        content: converted,
                        representation,
                        navigation,
                        raw_html: include_raw_html.then_some(html),
                        screenshot,
                        thin_content_threshold,
                    }))
                })
                .await
                .map_err(|e| EngineError::Internal(format!("extraction task failed: {e}")))?
            })
            .await;

        let result = self.finish(&tracker, result)?;
        info!(
            job = tracker.job_id(),
            url = %result.url,
            text_length = result.signals.text_length,
            thin_content = result.signals.thin_content,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Extraction complete"
        );
        Ok(result)
    }

    /// Render `url` to PDF with a 1200x800 print viewport.
    ///
    /// # Errors
    ///
    /// Any [`EngineError`].
    pub async fn render_pdf(&self, url: &str, options: PdfOptions) -> EngineResult<RenderedDocument> {
        let started = Instant::now();
        let tracker = Arc::new(JobTracker::new(uuid::Uuid::new_v4().to_string()));
        let target = self.validate(url, &tracker, started).await?;

        let budget = self.config.budget(Endpoint::Pdf);
        let render_timeout = options.render_timeout.unwrap_or(budget.render_timeout);
        let plan = self.navigation_plan(
            Viewport::new(PDF_VIEWPORT_WIDTH, PDF_VIEWPORT_HEIGHT),
            render_timeout,
        );
        let print = PrintOptions {
            paper: options.paper,
            landscape: options.landscape,
            print_background: options.print_background,
            margin_px: options.margin_px,
        };

        tracker.advance(JobState::Navigating);
        let session = self
            .acquire(budget.request_timeout.max(render_timeout), options.cancel.as_ref(), &tracker)
            .await?;

        let job = Arc::clone(&tracker);
        let result = session
            .run(move |page| async move {
                let target = self.revalidate(target).await?;
                let navigation = navigate(&page, target, &plan, &self.metrics).await?;
                advance_loaded(&job, navigation);
                let bytes = page.pdf(print).await?;
                job.advance(JobState::Converting);
                Ok(RenderedDocument {
                    bytes,
                    mime_type: "application/pdf".to_string(),
                    filename: format!("page-{}.pdf", chrono::Utc::now().timestamp_millis()),
                })
            })
            .await;

        self.finish(&tracker, result)
    }

    /// Capture a PNG of `url`.
    ///
    /// # Errors
    ///
    /// Any [`EngineError`].
    pub async fn capture_screenshot(
        &self,
        url: &str,
        options: ScreenshotOptions,
    ) -> EngineResult<RenderedDocument> {
        let started = Instant::now();
        let tracker = Arc::new(JobTracker::new(uuid::Uuid::new_v4().to_string()));
        let target = self.validate(url, &tracker, started).await?;

        let budget = self.config.budget(Endpoint::Shot);
        let render_timeout = options.render_timeout.unwrap_or(budget.render_timeout);
        let plan = self.navigation_plan(
            Viewport::new(options.width, options.height).with_scale(options.device_scale_factor),
            render_timeout,
        );
        let capture = CaptureOptions {
            full_page: options.full_page,
        };

        tracker.advance(JobState::Navigating);
        let session = self
            .acquire(budget.request_timeout.max(render_timeout), options.cancel.as_ref(), &tracker)
            .await?;

        let job = Arc::clone(&tracker);
        let result = session
            .run(move |page| async move {
                let target = self.revalidate(target).await?;
                let navigation = navigate(&page, target, &plan, &self.metrics).await?;
                advance_loaded(&job, navigation);
                let bytes = page.screenshot(capture).await?;
                job.advance(JobState::Converting);
                Ok(RenderedDocument {
                    bytes,
                    mime_type: "image/png".to_string(),
                    filename: format!("shot-{}.png", chrono::Utc::now().timestamp_millis()),
                })
            })
            .await;

        self.finish(&tracker, result)
    }

    /// Close the shared browser process.
    ///
    /// # Errors
    ///
    /// [`EngineError::Internal`] when the browser does not shut down cleanly.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.manager
            .shutdown()
            .await
            .map_err(|e| EngineError::Internal(format!("browser shutdown failed: {e:#}")))
    }

    fn navigation_plan(&self, viewport: Viewport, render_timeout: Duration) -> NavigationPlan {
        let mut plan = NavigationPlan::new(viewport, render_timeout);
        plan.user_agent = Some(self.config.user_agent().to_string());
        plan.stealth = self.config.stealth();
        plan.block_trackers = self.config.block_trackers();
        plan.idle = IdleSettings {
            quiet_window: self.config.network_idle_window(),
            ..IdleSettings::default()
        };
        plan.selector_timeout = self.config.selector_timeout();
        plan.settle_delay = self.config.settle_delay();
        plan
    }

    async fn validate(
        &self,
        url: &str,
        tracker: &JobTracker,
        started: Instant,
    ) -> EngineResult<TargetDescriptor> {
        match self.policy.validate(url).await {
            Ok(target) => Ok(target),
            Err(error) => {
                self.metrics.emit(MetricEvent::failure(
                    Phase::RenderJob,
                    started.elapsed(),
                    error.failure_mode(),
                ));
                Err(self.fail(tracker, error))
            }
        }
    }

    /// Resolve the target again once the page exists, so the DNS answer the
    /// browser sees is at most one navigation old.
    async fn revalidate(&self, target: TargetDescriptor) -> EngineResult<TargetDescriptor> {
        self.policy.validate(target.original_url()).await
    }

    async fn acquire(
        &self,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
        tracker: &JobTracker,
    ) -> EngineResult<PageSession> {
        PageSession::acquire(&self.manager, self.metrics.clone(), timeout, cancel)
            .await
            .map_err(|error| self.fail(tracker, error))
    }

    fn finish<T>(&self, tracker: &JobTracker, result: EngineResult<T>) -> EngineResult<T> {
        match result {
            Ok(value) => {
                tracker.advance(JobState::Done);
                Ok(value)
            }
            Err(error) => Err(self.fail(tracker, error)),
        }
    }

    fn fail(&self, tracker: &JobTracker, error: EngineError) -> EngineError {
        let cancelled = error.is_cancelled() && tracker.state().can_transition(JobState::Cancelled);
        tracker.advance(if cancelled {
            JobState::Cancelled
        } else {
            JobState::Failed
        });
        warn!(
            job = tracker.job_id(),
            kind = %error.kind(),
            state = %tracker.state(),
            "Render job failed: {error}"
        );
        error
    }
}

fn advance_loaded(job: &JobTracker, navigation: NavigationOutcome) {
    job.advance(match navigation {
        NavigationOutcome::Loaded => JobState::Loaded,
        NavigationOutcome::TimedOutPartial => JobState::TimedOutPartial,
    });
    job.advance(JobState::Extracting);
}

/// Viewport PNG for the extraction result; failure other than cancellation
/// only drops the screenshot.
async fn optional_screenshot(page: &SessionPage) -> EngineResult<Option<Vec<u8>>> {
    match page.screenshot(CaptureOptions::default()).await {
        Ok(png) => Ok(Some(png)),
        Err(error @ EngineError::Cancelled(_)) => Err(error),
        Err(error) => {
            warn!("Screenshot for extraction result failed: {error}");
            Ok(None)
        }
    }
}
