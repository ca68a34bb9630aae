//! Error taxonomy for rendering and extraction jobs.
//!
//! Every public operation returns [`EngineError`]. Internal browser plumbing
//! works in `anyhow::Result` and is classified into one of these kinds at the
//! session and navigation boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::cancellation::CancelReason;

/// Stable, machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTarget,
    ForbiddenTarget,
    EngineUnavailable,
    NavigationTimeout,
    NavigationFailed,
    ExtractionFailed,
    Cancelled,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidTarget => "invalid_target",
            Self::ForbiddenTarget => "forbidden_target",
            Self::EngineUnavailable => "engine_unavailable",
            Self::NavigationTimeout => "navigation_timeout",
            Self::NavigationFailed => "navigation_failed",
            Self::ExtractionFailed => "extraction_failed",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the shared browser process could not be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchFailure {
    /// No Chrome/Chromium executable could be found or downloaded
    MissingBinary,
    /// The sandbox or filesystem permissions prevented the process from starting
    Sandbox,
    /// The process did not become ready within the launch timeout
    LaunchTimeout,
    Other,
}

impl LaunchFailure {
    /// Classify a launch error by inspecting its message chain.
    #[must_use]
    pub fn classify(error: &anyhow::Error) -> Self {
        let msg = format!("{error:#}").to_lowercase();

        if msg.contains("timed out") || msg.contains("timeout") {
            return Self::LaunchTimeout;
        }

        if msg.contains("sandbox")
            || msg.contains("permission denied")
            || msg.contains("eacces")
            || msg.contains("operation not permitted")
        {
            return Self::Sandbox;
        }

        if msg.contains("executable not found")
            || msg.contains("no such file")
            || msg.contains("failed to fetch browser")
            || msg.contains("could not find")
        {
            return Self::MissingBinary;
        }

        Self::Other
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingBinary => "missing_binary",
            Self::Sandbox => "sandbox",
            Self::LaunchTimeout => "launch_timeout",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for LaunchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the rendering engine.
///
/// `Clone` is required because a single launch outcome is shared by every
/// caller that joined an in-flight launch.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("forbidden target: {0}")]
    ForbiddenTarget(String),

    #[error("browser engine unavailable ({failure}): {message}")]
    EngineUnavailable {
        failure: LaunchFailure,
        message: String,
    },

    /// Soft timeout: only raised when the caller opted out of partial results
    #[error("navigation did not settle within {elapsed_ms}ms")]
    NavigationTimeout { elapsed_ms: u64 },

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("operation cancelled: {0}")]
    Cancelled(CancelReason),

    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTarget(_) => ErrorKind::InvalidTarget,
            Self::ForbiddenTarget(_) => ErrorKind::ForbiddenTarget,
            Self::EngineUnavailable { .. } => ErrorKind::EngineUnavailable,
            Self::NavigationTimeout { .. } => ErrorKind::NavigationTimeout,
            Self::NavigationFailed(_) => ErrorKind::NavigationFailed,
            Self::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Failure label recorded on metric events.
    #[must_use]
    pub fn failure_mode(&self) -> String {
        match self {
            Self::EngineUnavailable { failure, .. } => {
                format!("{}:{}", self.kind().as_str(), failure.as_str())
            }
            Self::Cancelled(reason) => format!("{}:{}", self.kind().as_str(), reason.as_str()),
            _ => self.kind().as_str().to_string(),
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Errors raised before any browser resource is allocated.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidTarget(_) | Self::ForbiddenTarget(_))
    }
}

/// Convenience alias for Result with `EngineError`
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_launch_failures_by_message() {
        let missing = anyhow::anyhow!("Chrome/Chromium executable not found");
        assert_eq!(LaunchFailure::classify(&missing), LaunchFailure::MissingBinary);

        let sandbox = anyhow::anyhow!("No usable sandbox! Update your kernel");
        assert_eq!(LaunchFailure::classify(&sandbox), LaunchFailure::Sandbox);

        let timeout = anyhow::anyhow!("browser launch timed out after 30000ms");
        assert_eq!(LaunchFailure::classify(&timeout), LaunchFailure::LaunchTimeout);

        let other = anyhow::anyhow!("websocket closed");
        assert_eq!(LaunchFailure::classify(&other), LaunchFailure::Other);
    }

    #[test]
    fn classification_reads_the_context_chain() {
        let inner = anyhow::anyhow!("Permission denied (os error 13)");
        let wrapped = inner.context("Failed to launch browser");
        assert_eq!(LaunchFailure::classify(&wrapped), LaunchFailure::Sandbox);
    }

    #[test]
    fn kinds_serialize_as_snake_case() -> anyhow::Result<()> {
        let json = serde_json::to_string(&ErrorKind::ForbiddenTarget)?;
        assert_eq!(json, "\"forbidden_target\"");
        Ok(())
    }

    #[test]
    fn failure_mode_includes_launch_classification() {
        let err = EngineError::EngineUnavailable {
            failure: LaunchFailure::MissingBinary,
            message: "not found".into(),
        };
        assert_eq!(err.failure_mode(), "engine_unavailable:missing_binary");
        assert_eq!(err.kind(), ErrorKind::EngineUnavailable);
        assert!(!err.is_validation());
        assert!(EngineError::ForbiddenTarget("x".into()).is_validation());
    }
}
