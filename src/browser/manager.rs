//! Lifecycle manager for the shared browser process.
//!
//! The browser is launched lazily on first use and reused afterwards.
//! Concurrent callers arriving during a launch join the same in-flight
//! attempt instead of starting their own. A failed attempt is remembered
//! only for diagnostics: the next call launches again.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::traits::{BrowserEngine, BrowserLauncher};
use crate::error::{EngineError, EngineResult, LaunchFailure};
use crate::metrics::{MetricEvent, MetricsEmitter, Phase};

type LaunchOutcome = EngineResult<Arc<dyn BrowserEngine>>;
type LaunchFuture = Shared<BoxFuture<'static, LaunchOutcome>>;

enum ProcessState {
    Uninitialized,
    Launching { attempt: u64, future: LaunchFuture },
    Ready(Arc<dyn BrowserEngine>),
    Failed { attempt: u64, error: EngineError },
}

/// Externally visible summary of the manager state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    Uninitialized,
    Launching,
    Ready,
    Failed(LaunchFailure),
}

enum Pending {
    Check(Arc<dyn BrowserEngine>),
    Join(u64, LaunchFuture),
}

/// Owner of the single shared browser process.
///
/// # Lifecycle
/// - Nothing is launched on construction
/// - The first `get_process()` launches (~2-3s); later calls reuse the handle
/// - A handle failing its health check is discarded and relaunched
/// - `shutdown()` closes the process
pub struct ProcessManager {
    launcher: Arc<dyn BrowserLauncher>,
    state: Mutex<ProcessState>,
    metrics: MetricsEmitter,
    launch_timeout: Duration,
    attempts: AtomicU64,
}

impl ProcessManager {
    #[must_use]
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        metrics: MetricsEmitter,
        launch_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            state: Mutex::new(ProcessState::Uninitialized),
            metrics,
            launch_timeout,
            attempts: AtomicU64::new(0),
        }
    }

    /// Return the ready browser, launching one if needed.
    ///
    /// # Errors
    ///
    /// [`EngineError::EngineUnavailable`] when the launch attempt this call
    /// started or joined failed.
    pub async fn get_process(&self) -> EngineResult<Arc<dyn BrowserEngine>> {
        loop {
            let pending = {
                let mut state = self.state.lock().await;
                match &*state {
                    ProcessState::Ready(engine) => Pending::Check(Arc::clone(engine)),
                    ProcessState::Launching { attempt, future } => {
                        debug!(attempt, "Joining in-flight browser launch");
                        Pending::Join(*attempt, future.clone())
                    }
                    ProcessState::Uninitialized | ProcessState::Failed { .. } => {
                        let (attempt, future) = self.start_launch();
                        *state = ProcessState::Launching {
                            attempt,
                            future: future.clone(),
                        };
                        Pending::Join(attempt, future)
                    }
                }
            };

            match pending {
                Pending::Check(engine) => match engine.health_check().await {
                    Ok(()) => return Ok(engine),
                    Err(e) => {
                        warn!("Browser health check failed: {e:#}. Triggering recovery...");
                        self.evict(&engine).await;
                    }
                },
                Pending::Join(attempt, future) => {
                    let outcome = future.await;
                    self.settle(attempt, &outcome).await;
                    return outcome;
                }
            }
        }
    }

    /// Spawn a launch attempt. It runs to completion even if every caller
    /// waiting on it goes away.
    fn start_launch(&self) -> (u64, LaunchFuture) {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let launcher = Arc::clone(&self.launcher);
        let metrics = self.metrics.clone();
        let timeout = self.launch_timeout;

        let task = tokio::spawn(async move {
            let started = Instant::now();
            info!(attempt, "Launching browser process");

            let result = match tokio::time::timeout(timeout, launcher.launch()).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!(
                    "browser launch timed out after {}ms",
                    timeout.as_millis()
                )),
            };

            match result {
                Ok(engine) => {
                    info!(attempt, elapsed_ms = started.elapsed().as_millis() as u64, "Browser ready");
                    metrics.emit(MetricEvent::success(Phase::Launch, started.elapsed()));
                    Ok(engine)
                }
                Err(e) => {
                    let failure = LaunchFailure::classify(&e);
                    let error = EngineError::EngineUnavailable {
                        failure,
                        message: format!("{e:#}"),
                    };
                    warn!(attempt, failure = %failure, "Browser launch failed: {e:#}");
                    metrics.emit(MetricEvent::failure(
                        Phase::Launch,
                        started.elapsed(),
                        error.failure_mode(),
                    ));
                    Err(error)
                }
            }
        });

        let future = async move {
            task.await.unwrap_or_else(|e| {
                Err(EngineError::Internal(format!("browser launch task failed: {e}")))
            })
        }
        .boxed()
        .shared();

        (attempt, future)
    }

    /// Record the outcome of `attempt` unless a newer state replaced it.
    async fn settle(&self, attempt: u64, outcome: &LaunchOutcome) {
        let mut state = self.state.lock().await;
        let current = matches!(&*state, ProcessState::Launching { attempt: a, .. } if *a == attempt);
        if !current {
            return;
        }
        *state = match outcome {
            Ok(engine) => ProcessState::Ready(Arc::clone(engine)),
            Err(error) => ProcessState::Failed {
                attempt,
                error: error.clone(),
            },
        };
    }

    /// Drop an unhealthy handle if it is still the current one.
    async fn evict(&self, engine: &Arc<dyn BrowserEngine>) {
        let evicted = {
            let mut state = self.state.lock().await;
            match &*state {
                ProcessState::Ready(current) if Arc::ptr_eq(current, engine) => {
                    *state = ProcessState::Uninitialized;
                    true
                }
                _ => false,
            }
        };

        if evicted {
            // Best-effort: the process may already be dead
            if let Err(e) = engine.shutdown().await {
                debug!("Cleanup of crashed browser failed: {e:#}");
            }
            info!("Crashed browser cleaned up, a new instance will be launched");
        }
    }

    pub async fn status(&self) -> ProcessStatus {
        match &*self.state.lock().await {
            ProcessState::Uninitialized => ProcessStatus::Uninitialized,
            ProcessState::Launching { .. } => ProcessStatus::Launching,
            ProcessState::Ready(_) => ProcessStatus::Ready,
            ProcessState::Failed { error, attempt } => {
                debug!(attempt, "Last browser launch failed: {error}");
                match error {
                    EngineError::EngineUnavailable { failure, .. } => {
                        ProcessStatus::Failed(*failure)
                    }
                    _ => ProcessStatus::Failed(LaunchFailure::Other),
                }
            }
        }
    }

    /// Number of launch attempts started so far.
    #[must_use]
    pub fn launch_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Close the browser if one is running or launching.
    ///
    /// Safe to call multiple times (subsequent calls are no-ops).
    ///
    /// # Errors
    ///
    /// Returns an error if closing the browser process fails.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, ProcessState::Uninitialized)
        };

        let engine = match previous {
            ProcessState::Ready(engine) => Some(engine),
            // A launch in flight would otherwise leak its process
            ProcessState::Launching { future, .. } => future.await.ok(),
            ProcessState::Uninitialized | ProcessState::Failed { .. } => None,
        };

        if let Some(engine) = engine {
            info!("Shutting down browser process");
            engine.shutdown().await?;
        }
        Ok(())
    }
}
