//! Per-request isolated page sessions.
//!
//! A [`PageSession`] owns one browser context with exactly one page and a
//! request-scoped cancellation token. [`PageSession::run`] executes the
//! caller's steps against a [`SessionPage`] and closes the context on every
//! exit path: success, error, cancellation, panic, and the `run` future
//! itself being dropped.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::browser::{BrowserContext, CaptureOptions, PageDriver, PrintOptions, ProcessManager, Viewport};
use crate::cancellation::{self, CancellationScope, CancellationToken, race_with_cancellation};
use crate::error::{EngineError, EngineResult};
use crate::metrics::{MetricEvent, MetricsEmitter, Phase};

/// Closes the context exactly once: explicitly via [`ContextGuard::close`],
/// or from `Drop` on a spawned task when the owner was dropped mid-flight.
struct ContextGuard {
    context: Option<Box<dyn BrowserContext>>,
}

impl ContextGuard {
    fn new(context: Box<dyn BrowserContext>) -> Self {
        Self {
            context: Some(context),
        }
    }

    async fn close(&mut self) {
        if let Some(context) = self.context.take() {
            close_context(context).await;
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(context = context.id(), "Session dropped mid-flight, closing context in background");
                handle.spawn(close_context(context));
            }
            Err(_) => {
                warn!(
                    context = context.id(),
                    "Session dropped outside a Tokio runtime; context is reclaimed at browser shutdown"
                );
            }
        }
    }
}

async fn close_context(context: Box<dyn BrowserContext>) {
    let id = context.id().to_string();
    match context.close().await {
        Ok(()) => debug!(context = %id, "Closed browser context"),
        Err(e) => warn!(context = %id, "Failed to close browser context: {e:#}"),
    }
}

/// One isolated context + page, bounded by a cancellation scope.
pub struct PageSession {
    guard: ContextGuard,
    page: Arc<dyn PageDriver>,
    scope: CancellationScope,
    metrics: MetricsEmitter,
    started: Instant,
}

impl std::fmt::Debug for PageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSession")
            .field("context", &self.guard.context.as_ref().map(|c| c.id().to_string()))
            .field("fired", &self.scope.token().is_fired())
            .finish_non_exhaustive()
    }
}

impl PageSession {
    /// Obtain the browser, create an isolated context and page, and derive a
    /// token bounded by `timeout` and the optional external token.
    ///
    /// # Errors
    ///
    /// - [`EngineError::EngineUnavailable`] when the browser cannot be launched
    /// - [`EngineError::Cancelled`] when the token fires before the page exists
    /// - [`EngineError::Internal`] when context or page creation fails
    pub async fn acquire(
        manager: &ProcessManager,
        metrics: MetricsEmitter,
        timeout: Duration,
        external: Option<&CancellationToken>,
    ) -> EngineResult<Self> {
        let started = Instant::now();
        let scope = cancellation::derive(external, timeout);

        let acquired = Self::open(manager, &scope).await;
        match acquired {
            Ok((guard, page)) => Ok(Self {
                guard,
                page,
                scope,
                metrics,
                started,
            }),
            Err(error) => {
                metrics.emit(MetricEvent::failure(
                    Phase::RenderJob,
                    started.elapsed(),
                    error.failure_mode(),
                ));
                Err(error)
            }
        }
    }

    async fn open(
        manager: &ProcessManager,
        scope: &CancellationScope,
    ) -> EngineResult<(ContextGuard, Arc<dyn PageDriver>)> {
        let token = scope.token();
        let engine = race_with_cancellation(token, manager.get_process()).await?;

        // Context creation is not raced: an abandoned create could leave a
        // context nobody owns
        let context = engine
            .new_context()
            .await
            .map_err(|e| EngineError::Internal(format!("failed to create browser context: {e:#}")))?;
        let mut guard = ContextGuard::new(context);

        let page = match guard.context.as_ref() {
            Some(context) => context.new_page().await,
            None => Err(anyhow::anyhow!("browser context vanished before page creation")),
        };
        let page = match page {
            Ok(page) => page,
            Err(e) => {
                guard.close().await;
                return Err(EngineError::Internal(format!("failed to create page: {e:#}")));
            }
        };

        if let Some(reason) = token.reason() {
            guard.close().await;
            return Err(EngineError::Cancelled(reason));
        }

        Ok((guard, page))
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        self.scope.token()
    }

    /// Run `task` against the page, racing it against the session token, then
    /// close the context and emit a `render_job` metric.
    ///
    /// # Errors
    ///
    /// Propagates the task's error, [`EngineError::Cancelled`] when the token
    /// fires first, or [`EngineError::Internal`] when the task panics.
    pub async fn run<T, F, Fut>(mut self, task: F) -> EngineResult<T>
    where
        F: FnOnce(SessionPage) -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let token = self.scope.token().clone();
        let page = SessionPage {
            driver: Arc::clone(&self.page),
            token: token.clone(),
            deadline: self.scope.deadline(),
        };

        let guarded = AssertUnwindSafe(task(page)).catch_unwind();
        let outcome = race_with_cancellation(&token, async move {
            guarded.await.unwrap_or_else(|panic| {
                Err(EngineError::Internal(format!(
                    "render task panicked: {}",
                    panic_message(panic.as_ref())
                )))
            })
        })
        .await;

        self.guard.close().await;

        let elapsed = self.started.elapsed();
        match &outcome {
            Ok(_) => self.metrics.emit(MetricEvent::success(Phase::RenderJob, elapsed)),
            Err(error) => {
                debug!(kind = %error.kind(), "Render job failed: {error}");
                self.metrics.emit(MetricEvent::failure(
                    Phase::RenderJob,
                    elapsed,
                    error.failure_mode(),
                ));
            }
        }

        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Cancellation-aware handle to the session's page.
///
/// Every call is raced against the session token and mapped into the
/// engine's error taxonomy.
#[derive(Clone)]
pub struct SessionPage {
    driver: Arc<dyn PageDriver>,
    token: CancellationToken,
    deadline: Instant,
}

impl std::fmt::Debug for SessionPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPage")
            .field("fired", &self.token.is_fired())
            .finish_non_exhaustive()
    }
}

impl SessionPage {
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Time left before the session's deadline fires.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Run `source` in every new document before the page's own scripts.
    pub async fn add_init_script(&self, source: &str) -> EngineResult<()> {
        race_with_cancellation(&self.token, async {
            self.driver
                .add_init_script(source)
                .await
                .map_err(|e| EngineError::NavigationFailed(format!("failed to install init script: {e:#}")))
        })
        .await
    }

    /// Refuse every request whose URL matches one of `patterns` (`*` wildcards).
    pub async fn block_urls(&self, patterns: &[String]) -> EngineResult<()> {
        race_with_cancellation(&self.token, async {
            self.driver
                .block_urls(patterns)
                .await
                .map_err(|e| EngineError::NavigationFailed(format!("failed to set request blocklist: {e:#}")))
        })
        .await
    }

    pub async fn set_viewport(&self, viewport: Viewport) -> EngineResult<()> {
        race_with_cancellation(&self.token, async {
            self.driver
                .set_viewport(viewport)
                .await
                .map_err(|e| EngineError::NavigationFailed(format!("failed to set viewport: {e:#}")))
        })
        .await
    }

    pub async fn set_user_agent(&self, user_agent: &str) -> EngineResult<()> {
        race_with_cancellation(&self.token, async {
            self.driver
                .set_user_agent(user_agent)
                .await
                .map_err(|e| EngineError::NavigationFailed(format!("failed to set user agent: {e:#}")))
        })
        .await
    }

    /// Navigate; protocol-level timeouts surface as `NavigationTimeout`, every
    /// other failure as `NavigationFailed`.
    pub async fn goto(&self, url: &str) -> EngineResult<()> {
        let started = Instant::now();
        race_with_cancellation(&self.token, async {
            self.driver.goto(url).await.map_err(|e| {
                let message = format!("{e:#}");
                let lowered = message.to_lowercase();
                if lowered.contains("timed out") || lowered.contains("timeout") {
                    EngineError::NavigationTimeout {
                        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    }
                } else {
                    EngineError::NavigationFailed(message)
                }
            })
        })
        .await
    }

    pub async fn evaluate(&self, expression: &str) -> EngineResult<serde_json::Value> {
        race_with_cancellation(&self.token, async {
            self.driver
                .evaluate(expression)
                .await
                .map_err(|e| EngineError::ExtractionFailed(format!("script evaluation failed: {e:#}")))
        })
        .await
    }

    pub async fn content(&self) -> EngineResult<String> {
        race_with_cancellation(&self.token, async {
            self.driver
                .content()
                .await
                .map_err(|e| EngineError::ExtractionFailed(format!("failed to read page HTML: {e:#}")))
        })
        .await
    }

    pub async fn screenshot(&self, options: CaptureOptions) -> EngineResult<Vec<u8>> {
        race_with_cancellation(&self.token, async {
            self.driver
                .screenshot(options)
                .await
                .map_err(|e| EngineError::ExtractionFailed(format!("failed to capture screenshot: {e:#}")))
        })
        .await
    }

    pub async fn pdf(&self, options: PrintOptions) -> EngineResult<Vec<u8>> {
        race_with_cancellation(&self.token, async {
            self.driver
                .pdf(options)
                .await
                .map_err(|e| EngineError::ExtractionFailed(format!("failed to print PDF: {e:#}")))
        })
        .await
    }

    /// Sleep unless the token fires first.
    pub async fn sleep(&self, duration: Duration) -> EngineResult<()> {
        race_with_cancellation(&self.token, async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
