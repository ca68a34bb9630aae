//! Locating, downloading and launching Chrome/Chromium.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

use crate::config::{EngineConfig, ExecutionMode};

/// Flags applied in every execution mode.
const COMMON_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-notifications",
    "--disable-desktop-notifications",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-component-extensions-with-background-pages",
    "--disable-features=TranslateUI",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-prompt-on-repost",
    "--metrics-recording-only",
    "--password-store=basic",
    "--use-mock-keychain",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Flags for containers and serverless hosts, where `/dev/shm` is small and
/// there is no GPU.
const HOSTED_ARGS: &[&str] = &[
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-software-rasterizer",
    "--font-render-hinting=none",
];

const SANDBOX_ARGS: &[&str] = &["--no-sandbox", "--disable-setuid-sandbox"];

/// A launched browser plus the handler task that drives its CDP connection.
///
/// The handler MUST be aborted once the browser is closed.
pub struct LaunchedBrowser {
    pub browser: Browser,
    pub handler: JoinHandle<()>,
    pub profile_dir: PathBuf,
}

/// Find Chrome/Chromium: configured path first, then platform locations,
/// then `which` on Unix.
///
/// # Errors
///
/// Returns an error if no executable exists on this machine.
pub fn find_browser_executable(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            info!("Using configured browser executable: {}", path.display());
            return Ok(path.to_path_buf());
        }
        warn!(
            "Configured browser executable does not exist: {}",
            path.display()
        );
    }

    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "~/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    for candidate in candidates {
        let path = match candidate.strip_prefix("~/") {
            Some(rest) => match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => continue,
            },
            None => PathBuf::from(candidate),
        };

        if path.exists() {
            info!("Found browser at: {}", path.display());
            return Ok(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in ["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output()
                && output.status.success()
            {
                let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !found.is_empty() {
                    info!("Found browser using 'which' command: {found}");
                    return Ok(PathBuf::from(found));
                }
            }
        }
    }

    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Download a managed Chromium into the user cache directory.
///
/// # Errors
///
/// Returns an error if the cache directory cannot be created or the
/// download fails.
pub async fn download_managed_browser() -> Result<PathBuf> {
    info!("Downloading managed Chromium browser...");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| {
            let fallback = std::env::temp_dir();
            warn!(
                "Could not determine user cache directory, using {}",
                fallback.display()
            );
            fallback
        })
        .join("kodegen")
        .join("chromium");

    std::fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );

    let revision_info = fetcher.fetch().await.context("Failed to fetch browser")?;
    info!(
        "Downloaded Chromium to: {}",
        revision_info.folder_path.display()
    );

    Ok(revision_info.executable_path)
}

/// Launch flags for the configured execution mode.
#[must_use]
pub fn launch_args(config: &EngineConfig) -> Vec<String> {
    let mut args: Vec<String> = COMMON_ARGS.iter().map(|a| (*a).to_string()).collect();
    args.push(format!("--user-agent={}", config.user_agent()));

    if config.execution_mode() == ExecutionMode::Hosted {
        args.extend(HOSTED_ARGS.iter().map(|a| (*a).to_string()));
    }
    if config.no_sandbox() {
        args.extend(SANDBOX_ARGS.iter().map(|a| (*a).to_string()));
    }

    args
}

/// Launch a browser with a fresh, uniquely named profile directory.
///
/// # Errors
///
/// Returns an error if no executable is available, the profile directory
/// cannot be created, or the process fails to start.
pub async fn launch_browser(config: &EngineConfig) -> Result<LaunchedBrowser> {
    let chrome_path = match find_browser_executable(config.chrome_executable()) {
        Ok(path) => path,
        Err(e) if config.allow_browser_download() => {
            warn!("{e}. Will download and use fetcher.");
            download_managed_browser().await?
        }
        Err(e) => return Err(e),
    };

    let profile_dir = config
        .profile_root()
        .join(format!("kodegen_render_{}", uuid::Uuid::new_v4().simple()));
    std::fs::create_dir_all(&profile_dir).context("Failed to create user data directory")?;

    let viewport = config.viewport();
    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(viewport.width, viewport.height)
        .user_data_dir(profile_dir.clone())
        .chrome_executable(chrome_path)
        .args(launch_args(config));

    builder = if config.headless() {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };

    let browser_config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

    info!(
        mode = %config.execution_mode(),
        profile = %profile_dir.display(),
        "Launching browser"
    );
    let launched = Browser::launch(browser_config).await;
    let (browser, mut handler) = match launched {
        Ok(pair) => pair,
        Err(e) => {
            remove_profile_dir(&profile_dir);
            return Err(anyhow::Error::new(e).context("Failed to launch browser"));
        }
    };

    let handler = task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let message = e.to_string();
                // Known chromiumoxide gaps for CDP messages it does not model
                let benign = message.contains("data did not match any variant of untagged enum Message")
                    || message.contains("Failed to deserialize WS response");
                if benign {
                    trace!("Suppressed benign CDP serialization error: {message}");
                } else {
                    error!("Browser handler error: {e:?}");
                }
            }
        }
        info!("Browser handler task completed");
    });

    Ok(LaunchedBrowser {
        browser,
        handler,
        profile_dir,
    })
}

/// Remove a profile directory; must run after the browser process exited.
pub fn remove_profile_dir(path: &Path) {
    if !path.exists() {
        return;
    }
    info!("Cleaning up profile directory: {}", path.display());
    if let Err(e) = std::fs::remove_dir_all(path) {
        warn!(
            "Failed to clean up profile directory {}: {}. Manual cleanup may be required.",
            path.display(),
            e
        );
    }
}
