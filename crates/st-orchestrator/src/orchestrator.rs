//! Session orchestrator
//!
//! Walks a transport plan one candidate at a time. Each attempt opens a
//! handle, establishes it within the candidate's timeout, and hands it to
//! the remote multiplexer. The handle is closed before the next candidate
//! starts, whatever the attempt's result.
//!
//! # State machine
//!
//! ```text
//! Idle ──▶ Connecting ──▶ Attached
//!              │  ▲
//!              │  └─ retryable failure, candidates remain
//!              ├────▶ Exhausted   (failure, nothing left to try)
//!              └────▶ Aborted     (non-retryable failure or cancellation)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use st_core::config::serde_utils::format_duration;
use st_core::session_lock::{SessionLockGuard, SessionRecord};
use st_core::{
    FailureKind, Multiplexer, MultiplexerError, Profile, ProfileError, ProfileStore,
    TransportCandidate, TransportHandle, TransportKind,
};

use crate::backend::BackendRegistry;
use crate::outcome::{
    AbortReason, AttemptOutcome, SessionOutcome, SessionStatus, TransportAttempt,
};
use crate::policy::{disposition, Disposition};
use crate::resolver::{self, TransportPlan};

/// Where a run currently stands
#[derive(Debug)]
enum State {
    Idle,
    Connecting(TransportCandidate),
    Attached {
        transport: TransportKind,
        created: bool,
    },
    Exhausted,
    Aborted(AbortReason),
}

/// Why an attempt did not attach
#[derive(Debug)]
enum AttemptError {
    Failed(FailureKind, String),
    Cancelled,
}

impl From<MultiplexerError> for AttemptError {
    fn from(e: MultiplexerError) -> Self {
        AttemptError::Failed(e.kind(), e.to_string())
    }
}

/// Drives one connection from profile name to attached session
pub struct SessionOrchestrator {
    store: Arc<ProfileStore>,
    backends: BackendRegistry,
    multiplexer: Arc<dyn Multiplexer>,
    cancel: CancellationToken,
    sessions_dir: Option<PathBuf>,
}

impl SessionOrchestrator {
    pub fn new(
        store: Arc<ProfileStore>,
        backends: BackendRegistry,
        multiplexer: Arc<dyn Multiplexer>,
    ) -> Self {
        Self {
            store,
            backends,
            multiplexer,
            cancel: CancellationToken::new(),
            sessions_dir: None,
        }
    }

    /// Observe `token`; cancelling it aborts the run and closes the in-flight handle
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Record attached sessions under `dir`
    pub fn with_session_locks(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sessions_dir = Some(dir.into());
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolve `profile_name` and run it
    ///
    /// Only profile resolution can fail; everything that happens after that
    /// is reported in the [`SessionOutcome`].
    pub async fn connect(&self, profile_name: &str) -> Result<SessionOutcome, ProfileError> {
        let profile = self.store.resolve(profile_name)?;
        Ok(self.run(&profile).await)
    }

    /// Run an already-resolved profile
    pub async fn run(&self, profile: &Profile) -> SessionOutcome {
        let mut plan = resolver::plan(profile);
        let mut attempts = Vec::new();
        let mut diagnostic = None;
        let mut state = State::Idle;

        tracing::info!(
            "Connecting profile {:?} ({} candidate(s), session {:?})",
            profile.name,
            plan.len(),
            profile.tmux_session
        );

        let (status, transport, created) = loop {
            state = match state {
                State::Idle => self.next_state(&mut plan),

                State::Connecting(candidate) => {
                    tracing::info!("Trying {} to {}", candidate.transport, candidate.target);
                    let (attempt, result) = self.attempt(profile, &candidate).await;
                    attempts.push(attempt);

                    match result {
                        Ok(created) => State::Attached {
                            transport: candidate.transport,
                            created,
                        },
                        Err(AttemptError::Cancelled) => State::Aborted(AbortReason::Cancelled),
                        Err(AttemptError::Failed(kind, message)) => {
                            tracing::warn!("{} failed ({}): {}", candidate.transport, kind, message);
                            diagnostic = Some(message);
                            match disposition(kind) {
                                Disposition::Continue => self.next_state(&mut plan),
                                Disposition::Abort => State::Aborted(AbortReason::Failure(kind)),
                            }
                        }
                    }
                }

                State::Attached { transport, created } => {
                    diagnostic = None;
                    break (SessionStatus::Attached, Some(transport), created);
                }
                State::Exhausted => break (SessionStatus::Exhausted, None, false),
                State::Aborted(AbortReason::Cancelled) => {
                    diagnostic = Some("cancelled".to_string());
                    break (
                        SessionStatus::Aborted {
                            reason: AbortReason::Cancelled,
                        },
                        None,
                        false,
                    );
                }
                State::Aborted(reason) => break (SessionStatus::Aborted { reason }, None, false),
            };
        };

        let not_attempted: Vec<TransportKind> = plan
            .drain_remaining()
            .into_iter()
            .map(|c| c.transport)
            .collect();

        tracing::info!("Profile {:?} finished: {}", profile.name, status);
        SessionOutcome {
            profile: profile.name.clone(),
            session: profile.tmux_session.clone(),
            attempts,
            transport,
            created,
            not_attempted,
            diagnostic,
            status,
        }
    }

    /// Next candidate, or the terminal state when there is none to try
    fn next_state(&self, plan: &mut TransportPlan) -> State {
        if self.cancel.is_cancelled() {
            return State::Aborted(AbortReason::Cancelled);
        }
        match plan.next_candidate() {
            Some(candidate) => State::Connecting(candidate),
            None => State::Exhausted,
        }
    }

    /// One candidate from open to close
    async fn attempt(
        &self,
        profile: &Profile,
        candidate: &TransportCandidate,
    ) -> (TransportAttempt, Result<bool, AttemptError>) {
        let started_at_ms = unix_millis();
        let start = Instant::now();

        let result = match self.backends.get(candidate.transport) {
            None => Err(AttemptError::Failed(
                FailureKind::Other,
                format!("no backend registered for {}", candidate.transport),
            )),
            Some(backend) => {
                let opened = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(AttemptError::Cancelled),
                    opened = backend.open(candidate) => {
                        opened.map_err(|e| AttemptError::Failed(e.kind(), e.to_string()))
                    }
                };
                match opened {
                    Ok(mut handle) => {
                        let result = self.drive(profile, candidate, handle.as_mut()).await;
                        handle.close().await;
                        result
                    }
                    Err(e) => Err(e),
                }
            }
        };

        let (outcome, diagnostic) = match &result {
            Ok(_) => (AttemptOutcome::Connected, None),
            Err(AttemptError::Failed(kind, message)) => {
                (AttemptOutcome::Failed(*kind), Some(message.clone()))
            }
            Err(AttemptError::Cancelled) => (AttemptOutcome::Cancelled, None),
        };

        let attempt = TransportAttempt {
            transport: candidate.transport,
            target: candidate.target.clone(),
            started_at_ms,
            elapsed_ms: start.elapsed().as_millis() as u64,
            outcome,
            diagnostic,
        };
        (attempt, result)
    }

    /// Establish the handle, then run the remote session step
    ///
    /// Returns whether the session was created.
    async fn drive(
        &self,
        profile: &Profile,
        candidate: &TransportCandidate,
        handle: &mut dyn TransportHandle,
    ) -> Result<bool, AttemptError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AttemptError::Cancelled),
            established = tokio::time::timeout(candidate.timeout, handle.establish()) => {
                match established {
                    Err(_) => {
                        return Err(AttemptError::Failed(
                            FailureKind::Timeout,
                            format!(
                                "{} did not connect within {}",
                                candidate.transport,
                                format_duration(&candidate.timeout)
                            ),
                        ))
                    }
                    Ok(Err(e)) => return Err(AttemptError::Failed(e.kind(), e.to_string())),
                    Ok(Ok(())) => {}
                }
            }
        }
        tracing::debug!("{} connected to {}", candidate.transport, candidate.target);

        let _lock = self.session_lock(profile, candidate, handle.pid());

        let session = profile.tmux_session.as_str();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AttemptError::Cancelled),
            attached = self.remote_session(handle, session) => attached,
        }
    }

    /// Attach to the session, creating it if it does not exist
    async fn remote_session(
        &self,
        handle: &mut dyn TransportHandle,
        session: &str,
    ) -> Result<bool, AttemptError> {
        match self.multiplexer.attach(handle, session).await {
            Ok(()) => Ok(false),
            Err(MultiplexerError::NoSuchSession(_)) => {
                tracing::debug!(
                    "No {} session {:?}, creating it",
                    self.multiplexer.name(),
                    session
                );
                self.multiplexer.create_and_attach(handle, session).await?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn session_lock(
        &self,
        profile: &Profile,
        candidate: &TransportCandidate,
        pid: Option<u32>,
    ) -> Option<SessionLockGuard> {
        let dir = self.sessions_dir.as_ref()?;
        let record = SessionRecord {
            profile: profile.name.clone(),
            pid: pid.unwrap_or_else(std::process::id),
            transport: candidate.transport,
            session: profile.tmux_session.clone(),
            started_at: unix_millis(),
        };
        match SessionLockGuard::acquire(dir, &record) {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!("Failed to write session record in {:?}: {}", dir, e);
                None
            }
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
