//! Per-request job state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Validating,
    Navigating,
    TimedOutPartial,
    Loaded,
    Extracting,
    Converting,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Navigating => "navigating",
            Self::TimedOutPartial => "timed_out_partial",
            Self::Loaded => "loaded",
            Self::Extracting => "extracting",
            Self::Converting => "converting",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition(&self, next: Self) -> bool {
        use JobState::{
            Cancelled, Converting, Done, Extracting, Failed, Loaded, Navigating, TimedOutPartial,
            Validating,
        };
        match (*self, next) {
            (Done | Failed | Cancelled, _) => false,
            (_, Failed) => true,
            (Navigating | Extracting, Cancelled) => true,
            (Validating, Navigating) => true,
            (Navigating, TimedOutPartial | Loaded) => true,
            (TimedOutPartial | Loaded, Extracting) => true,
            (Extracting, Converting) => true,
            (Converting, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and traces the state of one job.
///
/// Shared between the engine and the task running inside the page session,
/// so interior mutability is required.
#[derive(Debug)]
pub struct JobTracker {
    job_id: String,
    state: Mutex<JobState>,
}

impl JobTracker {
    #[must_use]
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            state: Mutex::new(JobState::Validating),
        }
    }

    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Move to `next`. Illegal transitions are logged and ignored; returns
    /// whether the transition happened.
    pub fn advance(&self, next: JobState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.can_transition(next) {
            trace!(job = %self.job_id, from = %*state, to = %next, "Job state transition");
            *state = next;
            true
        } else {
            warn!(job = %self.job_id, from = %*state, to = %next, "Ignoring illegal job state transition");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_legal() {
        let path = [
            JobState::Validating,
            JobState::Navigating,
            JobState::TimedOutPartial,
            JobState::Extracting,
            JobState::Converting,
            JobState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn failed_from_any_non_terminal_state() {
        for state in [
            JobState::Validating,
            JobState::Navigating,
            JobState::Loaded,
            JobState::Extracting,
            JobState::Converting,
        ] {
            assert!(state.can_transition(JobState::Failed));
        }
        assert!(!JobState::Done.can_transition(JobState::Failed));
    }

    #[test]
    fn cancelled_only_while_navigating_or_extracting() {
        assert!(JobState::Navigating.can_transition(JobState::Cancelled));
        assert!(JobState::Extracting.can_transition(JobState::Cancelled));
        assert!(!JobState::Validating.can_transition(JobState::Cancelled));
        assert!(!JobState::Converting.can_transition(JobState::Cancelled));
    }

    #[test]
    fn tracker_ignores_illegal_transitions() {
        let tracker = JobTracker::new("job-1");
        assert!(!tracker.advance(JobState::Extracting));
        assert_eq!(tracker.state(), JobState::Validating);
        assert!(tracker.advance(JobState::Navigating));
        assert!(tracker.advance(JobState::Cancelled));
        assert!(!tracker.advance(JobState::Failed));
        assert_eq!(tracker.state(), JobState::Cancelled);
    }
}
