// Supervision Session Domain Model

use serde::{Deserialize, Serialize};

use super::error::{DomainError, Result};
use super::exit_status::ExitStatus;

/// Lifecycle of one supervision session
///
/// ```text
/// NotStarted -> Spawning -> Streaming -> Waiting -> Exited -> Done
///                  |            |            ^
///                  v            v            |
///                Failed    Terminating ------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Spawning,
    Streaming,
    Terminating,
    Waiting,
    Exited(ExitStatus),
    Done,
    Failed,
}

impl SessionState {
    /// Move to `next`, rejecting edges the lifecycle does not allow
    pub fn transition(self, next: SessionState) -> Result<SessionState> {
        use SessionState::*;

        let allowed = matches!(
            (self, next),
            (NotStarted, Spawning)
                | (Spawning, Streaming)
                | (Spawning, Failed)
                | (Streaming, Waiting)
                | (Streaming, Terminating)
                | (Terminating, Waiting)
                | (Waiting, Exited(_))
                | (Waiting, Failed)
                | (Exited(_), Done)
        );

        if allowed {
            Ok(next)
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::NotStarted => write!(f, "NOT_STARTED"),
            SessionState::Spawning => write!(f, "SPAWNING"),
            SessionState::Streaming => write!(f, "STREAMING"),
            SessionState::Terminating => write!(f, "TERMINATING"),
            SessionState::Waiting => write!(f, "WAITING"),
            SessionState::Exited(status) => write!(f, "EXITED({status})"),
            SessionState::Done => write!(f, "DONE"),
            SessionState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Outcome of a completed session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub status: ExitStatus,
    pub lines_forwarded: usize,
    pub duration_ms: i64,
    /// True when the caller cancelled and the child was terminated
    pub cancelled: bool,
}
