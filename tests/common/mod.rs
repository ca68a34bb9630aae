//! Test doubles for the render engine test suite
//!
//! In-memory implementations of the browser, resolver and metrics seams so
//! every scenario runs without a real Chrome or network.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use kodegen_tools_render::{
    BrowserContext, BrowserEngine, BrowserLauncher, CaptureOptions, EngineConfig, MetricEvent,
    MetricsSink, PageDriver, Phase, PrintOptions, RenderEngine, TargetResolver, Viewport,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Script responses keyed by a substring of the evaluated expression.
pub type Evaluations = Vec<(&'static str, Value)>;

/// What every page created by a [`MockEngine`] does.
#[derive(Debug, Clone)]
pub struct PageBehavior {
    pub html: String,
    pub goto_delay: Duration,
    pub goto_error: Option<String>,
    pub evaluations: Evaluations,
}

impl Default for PageBehavior {
    fn default() -> Self {
        Self {
            html: "<html><head><title>Empty</title></head><body></body></html>".to_string(),
            goto_delay: Duration::ZERO,
            goto_error: None,
            evaluations: idle_page(),
        }
    }
}

impl PageBehavior {
    pub fn with_html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Self::default()
        }
    }

    pub fn respond(mut self, needle: &'static str, value: Value) -> Self {
        self.evaluations.insert(0, (needle, value));
        self
    }
}

/// Responses for a page that is immediately idle.
pub fn idle_page() -> Evaluations {
    vec![(
        "performance.getEntriesByType",
        json!({ "ready": "complete", "resources": 3 }),
    )]
}

/// Counters shared by an engine and all of its contexts and pages.
#[derive(Debug, Default)]
pub struct BrowserCounters {
    pub contexts_created: AtomicUsize,
    pub contexts_closed: AtomicUsize,
    pub pages_created: AtomicUsize,
    pub navigations: AtomicUsize,
    pub shutdowns: AtomicUsize,
    /// Page calls in the order they arrived, across all pages
    pub journal: Mutex<Vec<String>>,
}

impl BrowserCounters {
    pub fn created(&self) -> usize {
        self.contexts_created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.contexts_closed.load(Ordering::SeqCst)
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    fn record(&self, entry: impl Into<String>) {
        self.journal.lock().unwrap().push(entry.into());
    }
}

pub struct MockEngine {
    pub counters: Arc<BrowserCounters>,
    pub behavior: PageBehavior,
    pub healthy: AtomicBool,
    pub fail_page_creation: bool,
}

impl MockEngine {
    pub fn new(behavior: PageBehavior) -> Arc<Self> {
        Arc::new(Self {
            counters: Arc::default(),
            behavior,
            healthy: AtomicBool::new(true),
            fail_page_creation: false,
        })
    }
}

#[async_trait]
impl BrowserEngine for MockEngine {
    async fn health_check(&self) -> Result<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(anyhow!("browser connection closed"))
        }
    }

    async fn new_context(&self) -> Result<Box<dyn BrowserContext>> {
        let n = self.counters.contexts_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockContext {
            id: format!("ctx-{n}"),
            counters: Arc::clone(&self.counters),
            behavior: self.behavior.clone(),
            fail_page_creation: self.fail_page_creation,
            closed: AtomicBool::new(false),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockContext {
    id: String,
    counters: Arc<BrowserCounters>,
    behavior: PageBehavior,
    fail_page_creation: bool,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserContext for MockContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self) -> Result<Arc<dyn PageDriver>> {
        if self.fail_page_creation {
            return Err(anyhow!("target crashed"));
        }
        self.counters.pages_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockPage {
            counters: Arc::clone(&self.counters),
            behavior: self.behavior.clone(),
            viewport: Mutex::new(None),
            user_agent: Mutex::new(None),
        }))
    }

    async fn close(&self) -> Result<()> {
        assert!(
            !self.closed.swap(true, Ordering::SeqCst),
            "context {} closed twice",
            self.id
        );
        self.counters.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockPage {
    counters: Arc<BrowserCounters>,
    behavior: PageBehavior,
    pub viewport: Mutex<Option<Viewport>>,
    pub user_agent: Mutex<Option<String>>,
}

#[async_trait]
impl PageDriver for MockPage {
    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        *self.viewport.lock().unwrap() = Some(viewport);
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        *self.user_agent.lock().unwrap() = Some(user_agent.to_string());
        Ok(())
    }

    async fn add_init_script(&self, source: &str) -> Result<()> {
        let hides_webdriver = source.contains("'webdriver'");
        self.counters.record(format!("init_script:webdriver={hides_webdriver}"));
        Ok(())
    }

    async fn block_urls(&self, patterns: &[String]) -> Result<()> {
        self.counters.record(format!("block_urls:{}", patterns.len()));
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        self.counters.record(format!("goto:{url}"));
        if !self.behavior.goto_delay.is_zero() {
            tokio::time::sleep(self.behavior.goto_delay).await;
        }
        match &self.behavior.goto_error {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        Ok(self
            .behavior
            .evaluations
            .iter()
            .find(|(needle, _)| expression.contains(needle))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null))
    }

    async fn content(&self) -> Result<String> {
        Ok(self.behavior.html.clone())
    }

    async fn screenshot(&self, _options: CaptureOptions) -> Result<Vec<u8>> {
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn pdf(&self, _options: PrintOptions) -> Result<Vec<u8>> {
        Ok(b"%PDF-1.7".to_vec())
    }
}

/// Launcher failing a configurable number of times before handing out
/// `engine`.
pub struct MockLauncher {
    pub engine: Arc<MockEngine>,
    pub failures_remaining: AtomicUsize,
    pub failure_message: String,
    pub launches: AtomicUsize,
    pub delay: Duration,
}

impl MockLauncher {
    pub fn new(engine: Arc<MockEngine>) -> Arc<Self> {
        Self::failing(engine, 0)
    }

    pub fn failing(engine: Arc<MockEngine>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            engine,
            failures_remaining: AtomicUsize::new(failures),
            failure_message: "Chrome executable not found".to_string(),
            launches: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    pub fn slow(engine: Arc<MockEngine>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            engine,
            failures_remaining: AtomicUsize::new(0),
            failure_message: String::new(),
            launches: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserEngine>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(anyhow!("{}", self.failure_message));
        }
        Ok(Arc::clone(&self.engine) as Arc<dyn BrowserEngine>)
    }
}

/// Resolver answering from a fixed table and counting lookups.
#[derive(Default)]
pub struct StaticResolver {
    pub table: HashMap<String, Vec<IpAddr>>,
    pub calls: AtomicUsize,
}

impl StaticResolver {
    pub fn new(entries: &[(&str, &[&str])]) -> Arc<Self> {
        let table = entries
            .iter()
            .map(|(host, addrs)| {
                let ips = addrs.iter().map(|a| a.parse().unwrap()).collect();
                ((*host).to_string(), ips)
            })
            .collect();
        Arc::new(Self {
            table,
            calls: AtomicUsize::new(0),
        })
    }

    /// `example.com` and `shop.example` resolving to public addresses.
    pub fn public() -> Arc<Self> {
        Self::new(&[
            ("example.com", &["93.184.216.34", "2606:2800:220:1:248:1893:25c8:1946"]),
            ("shop.example", &["203.0.113.10"]),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetResolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.table
            .get(host)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such host {host}")))
    }
}

/// Sink keeping every event for assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn phase(&self, phase: Phase) -> Vec<MetricEvent> {
        self.events().into_iter().filter(|e| e.phase == phase).collect()
    }
}

impl MetricsSink for RecordingSink {
    fn record(&self, event: &MetricEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Config with short waits so engine tests finish in milliseconds.
pub fn fast_config() -> EngineConfig {
    EngineConfig::builder()
        .settle_delay(Duration::ZERO)
        .network_idle_window(Duration::from_millis(10))
        .build()
        .unwrap()
}

/// Fully wired engine over mocks.
pub struct Harness {
    pub engine: RenderEngine,
    pub browser: Arc<MockEngine>,
    pub launcher: Arc<MockLauncher>,
    pub resolver: Arc<StaticResolver>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(behavior: PageBehavior) -> Self {
        Self::with_config(behavior, fast_config())
    }

    pub fn with_config(behavior: PageBehavior, config: EngineConfig) -> Self {
        let browser = MockEngine::new(behavior);
        let launcher = MockLauncher::new(Arc::clone(&browser));
        let resolver = StaticResolver::public();
        let sink = Arc::new(RecordingSink::default());
        let engine = RenderEngine::with_components(
            config,
            Arc::clone(&launcher) as Arc<dyn BrowserLauncher>,
            Arc::clone(&resolver) as Arc<dyn TargetResolver>,
            Arc::clone(&sink) as Arc<dyn MetricsSink>,
        );
        Self {
            engine,
            browser,
            launcher,
            resolver,
            sink,
        }
    }

    pub fn counters(&self) -> &BrowserCounters {
        &self.browser.counters
    }
}

/// Creates a test HTML document with specified content
pub fn create_test_html(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{}</title>
</head>
<body>
    {}
</body>
</html>"#,
        html_escape::encode_text(title),
        body
    )
}
