use kodegen_tools_render::config::Budget;
use kodegen_tools_render::{Endpoint, EngineConfig, ExecutionMode};
use std::collections::HashMap;
use std::time::Duration;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let env: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| env.get(key).cloned()
}

#[test]
fn production_node_env_selects_hosted_mode() {
    let config = EngineConfig::from_lookup(lookup(&[("NODE_ENV", "production")])).unwrap();
    assert_eq!(config.execution_mode(), ExecutionMode::Hosted);
    assert!(config.no_sandbox());
    assert!(config.viewport().jitter > 0);
}

#[test]
fn explicit_mode_wins_over_node_env() {
    let config = EngineConfig::from_lookup(lookup(&[
        ("NODE_ENV", "production"),
        ("RENDER_EXECUTION_MODE", "local"),
    ]))
    .unwrap();
    assert_eq!(config.execution_mode(), ExecutionMode::Local);
}

#[test]
fn allowlist_and_timeouts_come_from_the_environment() {
    let config = EngineConfig::from_lookup(lookup(&[
        ("BROWSER_TARGET_ALLOWLIST", "Example.com, docs.rs ,,"),
        ("RENDER_TIMEOUT_PDF_MS", "90000"),
        ("RENDER_HEADLESS", "false"),
        ("CHROMIUM_PATH", "/opt/chrome/chrome"),
    ]))
    .unwrap();

    assert_eq!(config.target_allowlist(), ["example.com", "docs.rs"]);
    let pdf = config.budget(Endpoint::Pdf);
    assert_eq!(pdf.render_timeout, Duration::from_secs(90));
    assert!(pdf.request_timeout >= pdf.render_timeout);
    assert!(!config.headless());
    assert_eq!(
        config.chrome_executable().map(|p| p.to_string_lossy().into_owned()),
        Some("/opt/chrome/chrome".to_string())
    );
}

#[test]
fn unparseable_values_are_errors() {
    assert!(EngineConfig::from_lookup(lookup(&[("RENDER_HEADLESS", "maybe")])).is_err());
    assert!(EngineConfig::from_lookup(lookup(&[("RENDER_TIMEOUT_SCRAPE_MS", "soon")])).is_err());
    assert!(EngineConfig::from_lookup(lookup(&[("RENDER_EXECUTION_MODE", "cloud")])).is_err());
    assert!(
        EngineConfig::from_lookup(lookup(&[("BROWSER_TARGET_ALLOWLIST", "http://example.com/")]))
            .is_err()
    );
}

#[test]
fn builder_rejects_degenerate_budgets() {
    assert!(
        EngineConfig::builder()
            .render_timeout(Endpoint::Shot, Duration::ZERO)
            .build()
            .is_err()
    );
    assert!(
        EngineConfig::builder()
            .budget(
                Endpoint::Scrape,
                Budget::new(Duration::from_secs(10), Duration::from_secs(5)),
            )
            .build()
            .is_err()
    );
    assert!(EngineConfig::builder().viewport(0, 720).build().is_err());
}

#[test]
fn stealth_switches_default_on_and_read_the_environment() {
    let defaults = EngineConfig::builder().build().unwrap();
    assert!(defaults.stealth());
    assert!(defaults.block_trackers());

    let config = EngineConfig::from_lookup(lookup(&[
        ("RENDER_STEALTH", "false"),
        ("RENDER_BLOCK_TRACKERS", "0"),
    ]))
    .unwrap();
    assert!(!config.stealth());
    assert!(!config.block_trackers());

    assert!(EngineConfig::from_lookup(lookup(&[("RENDER_STEALTH", "sometimes")])).is_err());
}
