//! End-to-end engine operations over the mock browser.

use kodegen_tools_render::navigation::stealth::TRACKER_URL_PATTERNS;
use kodegen_tools_render::{
    CancelReason, CancellationToken, EngineConfig, EngineError, ErrorKind, ExtractOptions,
    NavigationOutcome, PdfOptions, Phase, Representation, ScreenshotOptions,
};
use serde_json::json;
use std::time::{Duration, Instant};

mod common;
use common::{Harness, PageBehavior, create_test_html};

fn article() -> String {
    create_test_html(
        "Release Notes | Example",
        r#"<article>
            <h1>Release Notes</h1>
            <p>This release makes cancellation explicit, so every render job now stops promptly when the caller goes away.</p>
            <p>Browser contexts are closed on every exit path, which keeps long-running processes from accumulating memory.</p>
        </article>"#,
    )
}

#[tokio::test]
async fn extracts_markdown_from_a_loaded_page() {
    let harness = Harness::new(PageBehavior::with_html(article()));

    let result = harness
        .engine
        .extract("https://example.com/releases", Representation::Markdown, ExtractOptions::default())
        .await
        .unwrap();

    assert_eq!(result.title, "Release Notes | Example");
    assert_eq!(result.representation, Representation::Markdown);
    assert!(result.content.contains("cancellation explicit"));
    assert_eq!(result.signals.navigation, NavigationOutcome::Loaded);
    assert!(!result.signals.thin_content);
    assert!(result.raw_html.is_none());
    assert!(result.screenshot.is_none());
    assert_eq!(result.url, "https://example.com/releases");

    let counters = harness.counters();
    assert_eq!(counters.created(), 1);
    assert_eq!(counters.closed(), 1);
}

#[tokio::test]
async fn html_representation_carries_raw_html_and_screenshot() {
    let harness = Harness::new(PageBehavior::with_html(article()));
    let options = ExtractOptions {
        allow_screenshot: true,
        ..ExtractOptions::default()
    };

    let result = harness
        .engine
        .extract("https://example.com/releases", Representation::Html, options)
        .await
        .unwrap();

    assert!(result.content.contains("<p>"));
    assert_eq!(result.raw_html.as_deref(), Some(article().as_str()));
    assert_eq!(result.screenshot.as_deref(), Some("iVBORw0KGgo="));
}

#[tokio::test]
async fn hydration_only_page_returns_thin_content_with_state() {
    let behavior = PageBehavior::with_html(create_test_html("Shop", r#"<div id="__next"></div>"#))
        .respond(
            "window.__NEXT_DATA__",
            json!({ "props": { "pageProps": { "products": [{ "sku": "A1" }] } } }),
        );
    let harness = Harness::new(behavior);

    let result = harness
        .engine
        .extract("https://shop.example/", Representation::Text, ExtractOptions::default())
        .await
        .unwrap();

    assert!(result.signals.thin_content);
    assert!(result.signals.text_length < 200);
    assert_eq!(
        result.hydration_state["next_data"]["props"]["pageProps"]["products"][0]["sku"],
        "A1"
    );
    assert!(result.hydration_state["apollo_state"].is_null());
}

#[tokio::test]
async fn forbidden_target_allocates_no_browser_resources() {
    let harness = Harness::new(PageBehavior::default());

    let err = harness
        .engine
        .extract("http://127.0.0.1/admin", Representation::Markdown, ExtractOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ForbiddenTarget);
    assert_eq!(harness.launcher.launch_count(), 0);
    assert_eq!(harness.counters().created(), 0);

    let jobs = harness.sink.phase(Phase::RenderJob);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].failure_mode.as_deref(), Some("forbidden_target"));
}

#[tokio::test]
async fn client_cancel_stops_a_hung_navigation() {
    let behavior = PageBehavior {
        html: article(),
        goto_delay: Duration::from_secs(30),
        ..PageBehavior::default()
    };
    let harness = Harness::new(behavior);
    let cancel = CancellationToken::new();

    let firing = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        firing.fire(CancelReason::ClientDisconnected);
    });

    let started = Instant::now();
    let options = ExtractOptions {
        cancel: Some(cancel),
        ..ExtractOptions::default()
    };
    let err = harness
        .engine
        .extract("https://example.com/slow", Representation::Markdown, options)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled(CancelReason::ClientDisconnected)));
    assert!(started.elapsed() < Duration::from_secs(2));

    let counters = harness.counters();
    assert_eq!(counters.created(), 1);
    assert_eq!(counters.closed(), 1);

    let jobs = harness.sink.phase(Phase::RenderJob);
    assert_eq!(
        jobs[0].failure_mode.as_deref(),
        Some("cancelled:client_disconnected")
    );
}

#[tokio::test]
async fn slow_page_yields_partial_content() {
    let behavior = PageBehavior {
        html: article(),
        goto_delay: Duration::from_secs(5),
        ..PageBehavior::default()
    };
    let harness = Harness::new(behavior);
    let options = ExtractOptions {
        render_timeout: Some(Duration::from_millis(200)),
        ..ExtractOptions::default()
    };

    let result = harness
        .engine
        .extract("https://example.com/slow", Representation::Markdown, options)
        .await
        .unwrap();

    assert_eq!(result.signals.navigation, NavigationOutcome::TimedOutPartial);
    assert!(result.content.contains("cancellation explicit"));

    let navigations = harness.sink.phase(Phase::Navigation);
    assert!(!navigations[0].success);
    assert_eq!(navigations[0].failure_mode.as_deref(), Some("timed_out_partial"));
    assert!(harness.sink.phase(Phase::RenderJob)[0].success);
}

#[tokio::test]
async fn strict_mode_turns_partial_load_into_timeout() {
    let behavior = PageBehavior {
        goto_delay: Duration::from_secs(5),
        ..PageBehavior::default()
    };
    let harness = Harness::new(behavior);
    let options = ExtractOptions {
        render_timeout: Some(Duration::from_millis(200)),
        fail_on_navigation_timeout: true,
        ..ExtractOptions::default()
    };

    let err = harness
        .engine
        .extract("https://example.com/slow", Representation::Markdown, options)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NavigationTimeout);
    assert_eq!(harness.counters().closed(), 1);
}

#[tokio::test]
async fn transport_failure_is_navigation_failed() {
    let behavior = PageBehavior {
        goto_error: Some("net::ERR_NAME_NOT_RESOLVED".into()),
        ..PageBehavior::default()
    };
    let harness = Harness::new(behavior);

    let err = harness
        .engine
        .extract("https://example.com/", Representation::Markdown, ExtractOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NavigationFailed);
    assert_eq!(harness.counters().closed(), 1);
}

#[tokio::test]
async fn concurrent_jobs_share_one_browser_and_isolate_contexts() {
    let harness = Harness::new(PageBehavior::with_html(article()));

    let jobs = (0..4).map(|_| {
        harness.engine.extract(
            "https://example.com/releases",
            Representation::Text,
            ExtractOptions::default(),
        )
    });
    let results = futures::future::join_all(jobs).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(harness.launcher.launch_count(), 1);
    assert_eq!(harness.counters().created(), 4);
    assert_eq!(harness.counters().closed(), 4);

    let snapshot = harness.engine.metrics().snapshot();
    assert_eq!(snapshot.launch.succeeded, 1);
    assert_eq!(snapshot.render_job.succeeded, 4);
    assert_eq!(snapshot.navigation.succeeded, 4);
}

#[tokio::test]
async fn renders_pdf_and_screenshot_documents() {
    let harness = Harness::new(PageBehavior::with_html(article()));

    let pdf = harness
        .engine
        .render_pdf("https://example.com/releases", PdfOptions::default())
        .await
        .unwrap();
    assert_eq!(pdf.mime_type, "application/pdf");
    assert!(pdf.bytes.starts_with(b"%PDF"));
    assert!(pdf.filename.starts_with("page-") && pdf.filename.ends_with(".pdf"));

    let shot = harness
        .engine
        .capture_screenshot("https://example.com/releases", ScreenshotOptions::default())
        .await
        .unwrap();
    assert_eq!(shot.mime_type, "image/png");
    assert!(shot.bytes.starts_with(b"\x89PNG"));
    assert!(shot.filename.starts_with("shot-") && shot.filename.ends_with(".png"));

    assert_eq!(harness.counters().created(), 2);
    assert_eq!(harness.counters().closed(), 2);

    harness.engine.shutdown().await.unwrap();
    assert_eq!(
        harness
            .counters()
            .shutdowns
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn pdf_rejects_non_http_targets() {
    let harness = Harness::new(PageBehavior::default());
    let err = harness
        .engine
        .render_pdf("file:///etc/passwd", PdfOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTarget);
    assert_eq!(harness.launcher.launch_count(), 0);
}

#[tokio::test]
async fn evasions_and_tracker_blocklist_precede_navigation() {
    let harness = Harness::new(PageBehavior::with_html(article()));

    harness
        .engine
        .extract("https://example.com/releases", Representation::Markdown, ExtractOptions::default())
        .await
        .unwrap();

    let journal = harness.counters().journal();
    let position = |prefix: &str| journal.iter().position(|entry| entry.starts_with(prefix));
    let goto = position("goto:https://example.com/releases").unwrap();
    let evasions = position("init_script:webdriver=true").unwrap();
    let blocklist = position("block_urls:").unwrap();

    assert!(evasions < goto, "journal: {journal:?}");
    assert!(blocklist < goto, "journal: {journal:?}");
    assert_eq!(
        journal[blocklist],
        format!("block_urls:{}", TRACKER_URL_PATTERNS.len())
    );
}

#[tokio::test]
async fn stealth_and_blocking_can_be_switched_off() {
    let config = EngineConfig::builder()
        .settle_delay(Duration::ZERO)
        .network_idle_window(Duration::from_millis(10))
        .stealth(false)
        .block_trackers(false)
        .build()
        .unwrap();
    let harness = Harness::with_config(PageBehavior::with_html(article()), config);

    harness
        .engine
        .extract("https://example.com/releases", Representation::Text, ExtractOptions::default())
        .await
        .unwrap();

    assert_eq!(harness.counters().journal(), ["goto:https://example.com/releases"]);
}
