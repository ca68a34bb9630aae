//! Shared browser process: launch, health, isolation primitives.

pub mod chromium;
pub mod manager;
pub mod setup;
pub mod traits;

pub use chromium::{ChromiumEngine, ChromiumLauncher};
pub use manager::{ProcessManager, ProcessStatus};
pub use traits::{
    BrowserContext, BrowserEngine, BrowserLauncher, CaptureOptions, PageDriver, PaperFormat,
    PrintOptions, Viewport,
};
