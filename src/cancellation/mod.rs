//! Cancellation supervision for rendering jobs.
//!
//! A [`CancellationToken`] moves once, irreversibly, from pending to
//! fired(reason). [`derive`] combines a deadline with an optional external
//! token into a per-request [`CancellationScope`]; the first source to fire
//! wins. Cancellation is soft: [`race_with_cancellation`] stops waiting on an
//! operation but never kills it, and resource reclamation is left to the
//! page session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Why a token fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    DeadlineExceeded,
    ClientDisconnected,
    External(String),
}

impl CancelReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::ClientDisconnected => "client_disconnected",
            Self::External(_) => "external",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::ClientDisconnected => write!(f, "client disconnected"),
            Self::External(reason) => write!(f, "cancelled externally: {reason}"),
        }
    }
}

#[derive(Debug, Default)]
struct TokenState {
    reason: OnceLock<CancelReason>,
    signal: tokio_util::sync::CancellationToken,
}

/// Fire-once cancellation token shared by everything acting on one request.
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Returns `true` only for the call that actually fired it;
    /// later calls are no-ops and keep the original reason.
    pub fn fire(&self, reason: CancelReason) -> bool {
        // Reason is published before waiters are woken
        if self.inner.reason.set(reason).is_ok() {
            if let Some(reason) = self.inner.reason.get() {
                debug!(reason = %reason, "Cancellation token fired");
            }
            self.inner.signal.cancel();
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.get().cloned()
    }

    /// Resolves with the reason once the token fires.
    pub async fn fired(&self) -> CancelReason {
        self.inner.signal.cancelled().await;
        self.reason()
            .unwrap_or_else(|| CancelReason::External("unknown".to_string()))
    }
}

/// Per-request cancellation: a derived token plus the watcher that fires it.
///
/// Dropping the scope stops the watcher; the token itself stays valid.
#[derive(Debug)]
pub struct CancellationScope {
    token: CancellationToken,
    deadline: Instant,
    watcher: JoinHandle<()>,
}

impl CancellationScope {
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Drop for CancellationScope {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

/// Derive a request-scoped token that fires with `DeadlineExceeded` after
/// `timeout`, or with the external token's reason if that fires first.
///
/// Must be called from within a Tokio runtime.
#[must_use]
pub fn derive(external: Option<&CancellationToken>, timeout: Duration) -> CancellationScope {
    let token = CancellationToken::new();
    let deadline = Instant::now() + timeout;

    if let Some(reason) = external.and_then(CancellationToken::reason) {
        token.fire(reason);
    }

    let derived = token.clone();
    let external = external.cloned();
    let watcher = tokio::spawn(async move {
        let external_fired = async {
            match &external {
                Some(source) => source.fired().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = derived.inner.signal.cancelled() => {}
            reason = external_fired => {
                derived.fire(reason);
            }
            () = tokio::time::sleep_until(deadline) => {
                derived.fire(CancelReason::DeadlineExceeded);
            }
        }
    });

    CancellationScope {
        token,
        deadline,
        watcher,
    }
}

/// Await `operation` unless `token` fires first, in which case reject
/// immediately with [`EngineError::Cancelled`]. The abandoned operation is
/// dropped, not interrupted on the remote side.
pub async fn race_with_cancellation<F, T>(token: &CancellationToken, operation: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    if let Some(reason) = token.reason() {
        return Err(EngineError::Cancelled(reason));
    }

    tokio::select! {
        biased;
        reason = token.fired() => Err(EngineError::Cancelled(reason)),
        result = operation => result,
    }
}

/// Wrap a best-effort browser step with an explicit timeout.
///
/// Distinguishes between the timeout and the step's own failure in the
/// returned error message.
pub async fn with_step_timeout<F, T>(
    operation: F,
    timeout: Duration,
    operation_name: &str,
) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "{operation_name} timeout after {}ms",
            timeout.as_millis()
        )),
    }
}
