//! Phase metrics for launches, navigations and whole render jobs.
//!
//! [`MetricsEmitter`] keeps lock-free per-phase counters and forwards every
//! [`MetricEvent`] to a pluggable [`MetricsSink`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Launch,
    Navigation,
    RenderJob,
}

impl Phase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::Navigation => "navigation",
            Self::RenderJob => "render_job",
        }
    }
}

/// One timed phase outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricEvent {
    pub phase: Phase,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<String>,
}

impl MetricEvent {
    #[must_use]
    pub fn success(phase: Phase, elapsed: Duration) -> Self {
        Self {
            phase,
            duration_ms: duration_ms(elapsed),
            success: true,
            failure_mode: None,
        }
    }

    #[must_use]
    pub fn failure(phase: Phase, elapsed: Duration, failure_mode: impl Into<String>) -> Self {
        Self {
            phase,
            duration_ms: duration_ms(elapsed),
            success: false,
            failure_mode: Some(failure_mode.into()),
        }
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Destination for metric events (log pipeline, exporter, test recorder).
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &MetricEvent);
}

/// Default sink: one structured tracing line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&self, event: &MetricEvent) {
        tracing::info!(
            target: "render_engine::metrics",
            phase = event.phase.as_str(),
            duration_ms = event.duration_ms,
            success = event.success,
            failure_mode = event.failure_mode.as_deref().unwrap_or(""),
            "metric"
        );
    }
}

#[derive(Debug, Default)]
struct PhaseCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    total_duration_ms: AtomicU64,
}

impl PhaseCounters {
    fn record(&self, event: &MetricEvent) {
        if event.success {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.total_duration_ms
            .fetch_add(event.duration_ms, Ordering::SeqCst);
    }

    fn snapshot(&self) -> PhaseSnapshot {
        PhaseSnapshot {
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            total_duration_ms: self.total_duration_ms.load(Ordering::SeqCst),
        }
    }
}

/// Cloneable handle that counts and forwards metric events.
#[derive(Clone)]
pub struct MetricsEmitter {
    sink: Arc<dyn MetricsSink>,
    launch: Arc<PhaseCounters>,
    navigation: Arc<PhaseCounters>,
    render_job: Arc<PhaseCounters>,
}

impl std::fmt::Debug for MetricsEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsEmitter")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl MetricsEmitter {
    #[must_use]
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            sink,
            launch: Arc::default(),
            navigation: Arc::default(),
            render_job: Arc::default(),
        }
    }

    pub fn emit(&self, event: MetricEvent) {
        self.counters(event.phase).record(&event);
        self.sink.record(&event);
    }

    fn counters(&self, phase: Phase) -> &PhaseCounters {
        match phase {
            Phase::Launch => &self.launch,
            Phase::Navigation => &self.navigation,
            Phase::RenderJob => &self.render_job,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            launch: self.launch.snapshot(),
            navigation: self.navigation.snapshot(),
            render_job: self.render_job.snapshot(),
        }
    }
}

impl Default for MetricsEmitter {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseSnapshot {
    pub succeeded: u64,
    pub failed: u64,
    pub total_duration_ms: u64,
}

impl PhaseSnapshot {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.succeeded + self.failed
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 1.0;
        }
        self.succeeded as f64 / total as f64
    }

    #[must_use]
    pub fn mean_duration_ms(&self) -> Option<u64> {
        self.total_duration_ms.checked_div(self.total())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub launch: PhaseSnapshot,
    pub navigation: PhaseSnapshot,
    pub render_job: PhaseSnapshot,
}
