//! JavaScript snippets used while navigating.
//!
//! All snippets are synchronous IIFEs returning plain JSON so they behave the
//! same whether or not the backend awaits promises.

/// Document readiness plus the number of resource timing entries so far.
pub const IDLE_PROBE_SCRIPT: &str = r"
    (() => ({
        ready: document.readyState,
        resources: performance.getEntriesByType('resource').length
    }))()
";

/// Scroll one viewport down; reports whether the bottom was reached.
pub const SCROLL_STEP_SCRIPT: &str = r"
    (() => {
        const before = window.scrollY;
        window.scrollBy(0, window.innerHeight);
        const root = document.scrollingElement || document.documentElement;
        const bottom = window.scrollY + window.innerHeight >= root.scrollHeight - 2;
        return { moved: window.scrollY !== before, bottom };
    })()
";

/// Return to the top once lazy content has been triggered.
pub const SCROLL_RESET_SCRIPT: &str = "(() => { window.scrollTo(0, 0); return true; })()";

/// Expression testing whether `selector` matches; the selector is embedded as
/// a JSON string literal so it cannot break out of the script.
#[must_use]
pub fn selector_probe(selector: &str) -> String {
    let literal = serde_json::Value::String(selector.to_string());
    format!(
        "(() => {{ try {{ return document.querySelector({literal}) !== null; }} catch (e) {{ return false; }} }})()"
    )
}

/// Expression appending a `<style>` element holding `css`.
#[must_use]
pub fn style_injection(css: &str) -> String {
    let literal = serde_json::Value::String(css.to_string());
    format!(
        "(() => {{ const style = document.createElement('style'); style.setAttribute('data-render-engine', ''); \
         style.textContent = {literal}; (document.head || document.documentElement).appendChild(style); return true; }})()"
    )
}
