//! Session outcome and audit trail

use serde::Serialize;
use std::fmt;

use st_core::{FailureKind, Target, TransportKind};

/// Result of one transport attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "kind", rename_all = "kebab-case")]
pub enum AttemptOutcome {
    Connected,
    Failed(FailureKind),
    Cancelled,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Connected => f.write_str("connected"),
            AttemptOutcome::Failed(kind) => write!(f, "{}", kind),
            AttemptOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// One entry in the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportAttempt {
    pub transport: TransportKind,
    pub target: Target,
    /// Unix time in milliseconds
    pub started_at_ms: u64,
    pub elapsed_ms: u64,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Why a run stopped before exhausting its candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbortReason {
    /// A non-retryable failure
    Failure(FailureKind),
    /// The caller cancelled the run
    Cancelled,
}

/// Final state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum SessionStatus {
    Attached,
    Exhausted,
    Aborted { reason: AbortReason },
}

impl SessionStatus {
    /// Process exit code for this status
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionStatus::Attached => 0,
            SessionStatus::Exhausted => 2,
            SessionStatus::Aborted {
                reason: AbortReason::Failure(_),
            } => 3,
            SessionStatus::Aborted {
                reason: AbortReason::Cancelled,
            } => 130,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Attached => f.write_str("attached"),
            SessionStatus::Exhausted => f.write_str("exhausted"),
            SessionStatus::Aborted {
                reason: AbortReason::Failure(kind),
            } => write!(f, "aborted ({})", kind),
            SessionStatus::Aborted {
                reason: AbortReason::Cancelled,
            } => f.write_str("cancelled"),
        }
    }
}

/// Everything a caller learns from one `connect`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionOutcome {
    pub profile: String,
    /// tmux session name used on the remote side
    pub session: String,
    /// Audit trail in the order candidates were tried
    pub attempts: Vec<TransportAttempt>,
    /// Transport that attached, if any
    pub transport: Option<TransportKind>,
    /// Whether the remote session was created rather than reattached
    pub created: bool,
    /// Candidates skipped because the run stopped early
    pub not_attempted: Vec<TransportKind>,
    pub diagnostic: Option<String>,
    pub status: SessionStatus,
}

impl SessionOutcome {
    pub fn is_attached(&self) -> bool {
        self.status == SessionStatus::Attached
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}
