pub mod browser;
pub mod cancellation;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod navigation;
pub mod network_policy;
pub mod page_extractor;
pub mod session;
pub mod utils;

pub use browser::{
    BrowserContext, BrowserEngine, BrowserLauncher, CaptureOptions, ChromiumLauncher, PageDriver,
    PaperFormat, PrintOptions, ProcessManager, ProcessStatus, Viewport,
};
pub use cancellation::{CancelReason, CancellationScope, CancellationToken, race_with_cancellation};
pub use config::{Endpoint, EngineConfig, EngineConfigBuilder, ExecutionMode};
pub use content::{
    ContentSignals, ExtractionResult, ReadableContent, Representation, convert, extract_content,
    merge,
};
pub use engine::{
    ExtractOptions, JobState, PdfOptions, RenderEngine, RenderedDocument, ScreenshotOptions,
};
pub use error::{EngineError, EngineResult, ErrorKind, LaunchFailure};
pub use metrics::{MetricEvent, MetricsEmitter, MetricsSink, MetricsSnapshot, Phase, TracingSink};
pub use navigation::NavigationOutcome;
pub use network_policy::{NetworkPolicy, SystemResolver, TargetDescriptor, TargetResolver};
pub use page_extractor::{HiddenState, PageMetadata, extract_hidden_state};
pub use session::{PageSession, SessionPage};
