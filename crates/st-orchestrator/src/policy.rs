//! Failure policy

use st_core::FailureKind;

/// What the orchestrator does after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Move on to the next candidate, if any
    Continue,
    /// Stop; remaining candidates are not attempted
    Abort,
}

/// The policy table
///
/// `AuthFailed` and `HostKeyRejected` abort the run; every other kind
/// continues with the next candidate.
pub fn disposition(kind: FailureKind) -> Disposition {
    match kind {
        FailureKind::Timeout => Disposition::Continue,
        FailureKind::Refused => Disposition::Continue,
        FailureKind::AuthFailed => Disposition::Abort,
        FailureKind::HostKeyRejected => Disposition::Abort,
        FailureKind::MultiplexerUnavailable => Disposition::Continue,
        FailureKind::Other => Disposition::Continue,
    }
}
