//! Automation evasions and tracker blocking installed before navigation.
//!
//! The evasion script is registered with `Page.addScriptToEvaluateOnNewDocument`
//! so it runs in every frame before the page's own scripts can probe
//! `navigator`. Blocking uses `Network.setBlockedURLs` wildcard patterns.

/// Hides the usual headless tells: `navigator.webdriver`, empty
/// `languages`/`plugins`, a missing `window.chrome`, the notification
/// permission mismatch and the SwiftShader WebGL vendor strings.
pub const EVASION_SCRIPT: &str = r"
(() => {
    const define = (target, key, value) => {
        try {
            Object.defineProperty(target, key, { get: () => value, configurable: true });
        } catch (e) {}
    };

    define(Navigator.prototype, 'webdriver', undefined);
    define(Navigator.prototype, 'languages', Object.freeze(['en-US', 'en']));

    if (navigator.plugins.length === 0) {
        const pdf = { type: 'application/pdf', suffixes: 'pdf', description: 'Portable Document Format' };
        const entries = [
            { name: 'PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chromium PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
        ].map((plugin) => Object.assign(Object.create(Plugin.prototype), plugin, { length: 1, 0: pdf }));
        const plugins = Object.create(PluginArray.prototype);
        entries.forEach((plugin, index) => {
            plugins[index] = plugin;
            plugins[plugin.name] = plugin;
        });
        Object.defineProperty(plugins, 'length', { value: entries.length });
        plugins.item = (index) => entries[index] || null;
        plugins.namedItem = (name) => entries.find((p) => p.name === name) || null;
        define(Navigator.prototype, 'plugins', plugins);
    }

    if (!window.chrome) {
        window.chrome = {};
    }
    if (!window.chrome.runtime) {
        window.chrome.runtime = {
            connect: () => ({
                onMessage: { addListener() {}, removeListener() {} },
                postMessage() {},
                disconnect() {},
            }),
            sendMessage() {},
        };
    }

    if (window.navigator.permissions && window.navigator.permissions.query) {
        const query = window.navigator.permissions.query.bind(window.navigator.permissions);
        window.navigator.permissions.query = (parameters) =>
            parameters && parameters.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission, onchange: null })
                : query(parameters);
    }

    const spoofVendor = (proto) => {
        if (!proto) return;
        const getParameter = proto.getParameter;
        proto.getParameter = new Proxy(getParameter, {
            apply(target, ctx, args) {
                if (args[0] === 37445) return 'Intel Inc.';
                if (args[0] === 37446) return 'Intel Iris OpenGL Engine';
                return Reflect.apply(target, ctx, args);
            },
        });
    };
    spoofVendor(window.WebGLRenderingContext && WebGLRenderingContext.prototype);
    spoofVendor(window.WebGL2RenderingContext && WebGL2RenderingContext.prototype);
})();
";

/// Ad, analytics and session-replay hosts refused when tracker blocking is on.
pub const TRACKER_URL_PATTERNS: &[&str] = &[
    "*://*.doubleclick.net/*",
    "*://*.googlesyndication.com/*",
    "*://*.googleadservices.com/*",
    "*://*.google-analytics.com/*",
    "*://*.googletagmanager.com/*",
    "*://*.googletagservices.com/*",
    "*://*.adservice.google.com/*",
    "*://connect.facebook.net/*",
    "*://*.facebook.com/tr*",
    "*://*.scorecardresearch.com/*",
    "*://*.quantserve.com/*",
    "*://*.hotjar.com/*",
    "*://*.mouseflow.com/*",
    "*://*.fullstory.com/*",
    "*://*.segment.io/*",
    "*://cdn.segment.com/*",
    "*://*.mixpanel.com/*",
    "*://*.amplitude.com/*",
    "*://*.criteo.com/*",
    "*://*.criteo.net/*",
    "*://*.taboola.com/*",
    "*://*.outbrain.com/*",
    "*://*.adnxs.com/*",
    "*://*.amazon-adsystem.com/*",
    "*://*.moatads.com/*",
    "*://*.pubmatic.com/*",
    "*://*.rubiconproject.com/*",
    "*://*.openx.net/*",
    "*://*.bing.com/bat.js*",
    "*://snap.licdn.com/*",
    "*://static.ads-twitter.com/*",
    "*://*.clarity.ms/*",
];

#[must_use]
pub fn tracker_patterns() -> Vec<String> {
    TRACKER_URL_PATTERNS.iter().map(|p| (*p).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evasion_script_covers_webdriver_and_plugins() {
        assert!(EVASION_SCRIPT.contains("'webdriver'"));
        assert!(EVASION_SCRIPT.contains("'plugins'"));
        assert!(EVASION_SCRIPT.contains("'languages'"));
        assert!(EVASION_SCRIPT.trim_end().ends_with("})();"));
    }

    #[test]
    fn tracker_patterns_are_wildcard_urls() {
        assert!(
            TRACKER_URL_PATTERNS
                .iter()
                .all(|p| p.starts_with("*://") && p.contains('/'))
        );
        assert_eq!(tracker_patterns().len(), TRACKER_URL_PATTERNS.len());
    }
}
