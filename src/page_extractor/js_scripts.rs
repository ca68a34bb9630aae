//! JavaScript evaluation scripts
//!
//! This module contains the JavaScript code used to harvest hidden state
//! from rendered pages. Parsing and preference logic lives in Rust; the
//! scripts only collect raw values.

/// Raw text of every JSON-LD block, parsed on the Rust side so one broken
/// block cannot hide the others.
pub const JSON_LD_SCRIPT: &str = r#"
    (() => Array.from(document.querySelectorAll('script[type="application/ld+json"]'))
        .map(script => script.textContent || '')
        .filter(text => text.trim().length > 0))()
"#;

/// Every `<meta name|property=... content=...>` pair, keys lower-cased,
/// first occurrence wins, plus the document title.
pub const META_SCRIPT: &str = r"
    (() => {
        const tags = {};
        document.querySelectorAll('meta').forEach(tag => {
            const key = tag.getAttribute('property') || tag.getAttribute('name') || tag.getAttribute('itemprop');
            const content = tag.getAttribute('content');
            if (key && content !== null) {
                const normalized = key.trim().toLowerCase();
                if (!(normalized in tags)) {
                    tags[normalized] = content;
                }
            }
        });
        return { title: document.title || null, tags };
    })()
";

/// Absolute http(s) link targets in document order (deduplicated in Rust).
pub const LINKS_SCRIPT: &str = r"
    (() => Array.from(document.querySelectorAll('a[href]'))
        .map(a => a.href)
        .filter(href => href.startsWith('http://') || href.startsWith('https://')))()
";

/// Wrap a hydration global expression so it is evaluated in isolation:
/// a throwing getter, `undefined` or a non-serializable value yields `null`
/// instead of failing the harvest.
#[must_use]
pub fn hydration_probe(expression: &str) -> String {
    format!(
        "(() => {{ try {{ const value = ({expression}); \
         if (value === undefined || value === null) return null; \
         return JSON.parse(JSON.stringify(value)); }} catch (e) {{ return null; }} }})()"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hydration_probe_guards_expression() {
        let script = hydration_probe("window.__NEXT_DATA__");
        assert!(script.contains("try { const value = (window.__NEXT_DATA__);"));
        assert!(script.contains("catch (e) { return null; }"));
    }
}
