//! chromiumoxide-backed implementations of the browser traits.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::SetBlockedUrLsParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, PrintToPdfParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::ScreenshotParams;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::setup::{LaunchedBrowser, launch_browser, remove_profile_dir};
use super::traits::{
    BrowserContext, BrowserEngine, BrowserLauncher, CaptureOptions, PageDriver, PrintOptions,
    Viewport,
};
use crate::config::EngineConfig;

/// CSS pixels per inch, used to convert PDF margins.
const CSS_PX_PER_INCH: f64 = 96.0;

/// Launches real Chrome/Chromium processes.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: Arc<EngineConfig>,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserEngine>> {
        let launched = launch_browser(&self.config).await?;
        Ok(Arc::new(ChromiumEngine::new(launched)))
    }
}

/// Browser together with its handler task and profile directory.
///
/// Dropping it aborts the handler and removes the profile directory; the
/// chromiumoxide `Browser` kills the child process on drop.
struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    profile_dir: Option<PathBuf>,
}

impl BrowserWrapper {
    fn cleanup_profile_dir(&mut self) {
        if let Some(path) = self.profile_dir.take() {
            remove_profile_dir(&path);
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();
        if self.profile_dir.is_some() {
            warn!("Browser dropped without explicit shutdown - removing profile dir in Drop");
            self.cleanup_profile_dir();
        }
    }
}

/// The shared browser process.
///
/// Contexts and pages need shared access; only shutdown needs the write lock.
pub struct ChromiumEngine {
    inner: Arc<RwLock<Option<BrowserWrapper>>>,
}

impl ChromiumEngine {
    fn new(launched: LaunchedBrowser) -> Self {
        let wrapper = BrowserWrapper {
            browser: launched.browser,
            handler: launched.handler,
            profile_dir: Some(launched.profile_dir),
        };
        Self {
            inner: Arc::new(RwLock::new(Some(wrapper))),
        }
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn health_check(&self) -> Result<()> {
        let guard = self.inner.read().await;
        let wrapper = guard.as_ref().ok_or_else(|| anyhow!("browser has been shut down"))?;
        wrapper
            .browser
            .version()
            .await
            .context("Browser health check failed")?;
        Ok(())
    }

    async fn new_context(&self) -> Result<Box<dyn BrowserContext>> {
        let guard = self.inner.read().await;
        let wrapper = guard.as_ref().ok_or_else(|| anyhow!("browser has been shut down"))?;
        let response = wrapper
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .context("Failed to create browser context")?;
        let id = response.result.browser_context_id.clone();
        debug!(context = %id.inner(), "Created isolated browser context");

        Ok(Box::new(ChromiumContext {
            id,
            engine: Arc::clone(&self.inner),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut guard = self.inner.write().await;
        if let Some(mut wrapper) = guard.take() {
            info!("Shutting down shared browser");

            if let Err(e) = wrapper.browser.close().await {
                warn!("Failed to close browser cleanly: {e}");
            }
            if let Err(e) = wrapper.browser.wait().await {
                warn!("Failed to wait for browser exit: {e}");
            }

            // Profile removal only after the process released its file handles
            wrapper.cleanup_profile_dir();
        }
        Ok(())
    }
}

struct ChromiumContext {
    id: BrowserContextId,
    engine: Arc<RwLock<Option<BrowserWrapper>>>,
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    fn id(&self) -> &str {
        self.id.inner()
    }

    async fn new_page(&self) -> Result<Arc<dyn PageDriver>> {
        let guard = self.engine.read().await;
        let wrapper = guard.as_ref().ok_or_else(|| anyhow!("browser has been shut down"))?;
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.id.clone())
            .build()
            .map_err(anyhow::Error::msg)?;
        let page = wrapper
            .browser
            .new_page(params)
            .await
            .context("Failed to create page in browser context")?;

        Ok(Arc::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<()> {
        let guard = self.engine.read().await;
        // Nothing to dispose once the whole process is gone
        let Some(wrapper) = guard.as_ref() else {
            return Ok(());
        };
        wrapper
            .browser
            .execute(DisposeBrowserContextParams::new(self.id.clone()))
            .await
            .context("Failed to dispose browser context")?;
        debug!(context = %self.id.inner(), "Disposed browser context");
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.page
            .execute(
                SetDeviceMetricsOverrideParams::builder()
                    .width(i64::from(viewport.width))
                    .height(i64::from(viewport.height))
                    .device_scale_factor(viewport.device_scale_factor)
                    .mobile(false)
                    .build()
                    .map_err(anyhow::Error::msg)?,
            )
            .await?;
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.page
            .execute(SetUserAgentOverrideParams::new(user_agent))
            .await?;
        Ok(())
    }

    async fn add_init_script(&self, source: &str) -> Result<()> {
        self.page
            .evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await?;
        Ok(())
    }

    async fn block_urls(&self, patterns: &[String]) -> Result<()> {
        self.page
            .execute(SetBlockedUrLsParams::new(patterns.to_vec()))
            .await?;
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(expression).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn screenshot(&self, options: CaptureOptions) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(options.full_page)
            .build();
        Ok(self.page.screenshot(params).await?)
    }

    async fn pdf(&self, options: PrintOptions) -> Result<Vec<u8>> {
        let (width, height) = options.paper.inches();
        let margin = f64::from(options.margin_px) / CSS_PX_PER_INCH;
        let params = PrintToPdfParams {
            landscape: Some(options.landscape),
            print_background: Some(options.print_background),
            paper_width: Some(width),
            paper_height: Some(height),
            margin_top: Some(margin),
            margin_bottom: Some(margin),
            margin_left: Some(margin),
            margin_right: Some(margin),
            ..Default::default()
        };
        Ok(self.page.pdf(params).await?)
    }
}
