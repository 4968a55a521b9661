//! End-to-end orchestrator runs against scripted backends

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{store_with_order, Establish, FakeBackend, FakeMultiplexer};
use st_core::{FailureKind, MultiplexerError, ProfileError, TransportError, TransportKind};
use st_orchestrator::{
    AbortReason, AttemptOutcome, BackendRegistry, SessionOrchestrator, SessionStatus,
};

fn registry(mosh: &Arc<FakeBackend>, ssh: &Arc<FakeBackend>) -> BackendRegistry {
    BackendRegistry::new()
        .with(mosh.clone())
        .with(ssh.clone())
}

fn outcomes(outcome: &st_orchestrator::SessionOutcome) -> Vec<(TransportKind, AttemptOutcome)> {
    outcome
        .attempts
        .iter()
        .map(|a| (a.transport, a.outcome))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_timeout_falls_back_to_ssh() {
    let mosh = FakeBackend::new(TransportKind::Mosh, Establish::Hang);
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["mosh", "ssh"]"#, 5),
        registry(&mosh, &ssh),
        Arc::new(FakeMultiplexer::new().with_session("box1")),
    );

    let outcome = orchestrator.connect("box1").await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Attached);
    assert_eq!(outcome.transport, Some(TransportKind::Ssh));
    assert!(!outcome.created);
    assert_eq!(
        outcomes(&outcome),
        vec![
            (TransportKind::Mosh, AttemptOutcome::Failed(FailureKind::Timeout)),
            (TransportKind::Ssh, AttemptOutcome::Connected),
        ]
    );
    assert!(outcome.attempts[0].elapsed_ms >= 5_000);
    assert!(outcome.not_attempted.is_empty());
    assert_eq!(outcome.diagnostic, None);
    assert_eq!(outcome.exit_code(), 0);
    assert!(mosh.all_closed() && ssh.all_closed());
}

#[tokio::test]
async fn test_refused_mosh_creates_session_over_ssh() {
    let mosh = FakeBackend::new(
        TransportKind::Mosh,
        Establish::Fail(TransportError::Refused("ssh: connect to host 10.0.0.5 port 22: Connection refused".into())),
    );
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let multiplexer = Arc::new(FakeMultiplexer::new());
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["mosh", "ssh"]"#, 5),
        registry(&mosh, &ssh),
        multiplexer.clone(),
    );

    let outcome = orchestrator.connect("box1").await.unwrap();

    assert!(outcome.is_attached());
    assert!(outcome.created);
    assert_eq!(outcome.session, "box1");
    assert_eq!(
        outcomes(&outcome),
        vec![
            (TransportKind::Mosh, AttemptOutcome::Failed(FailureKind::Refused)),
            (TransportKind::Ssh, AttemptOutcome::Connected),
        ]
    );
    assert!(outcome.attempts[0]
        .diagnostic
        .as_deref()
        .unwrap()
        .contains("60001"));
    assert_eq!(multiplexer.calls(), vec!["attach box1", "create box1"]);
}

#[tokio::test]
async fn test_auth_failure_aborts() {
    let mosh = FakeBackend::new(
        TransportKind::Mosh,
        Establish::Fail(TransportError::AuthFailed("Permission denied (publickey)".into())),
    );
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["mosh", "ssh"]"#, 5),
        registry(&mosh, &ssh),
        Arc::new(FakeMultiplexer::new()),
    );

    let outcome = orchestrator.connect("box1").await.unwrap();

    assert_eq!(
        outcome.status,
        SessionStatus::Aborted {
            reason: AbortReason::Failure(FailureKind::AuthFailed)
        }
    );
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.not_attempted, vec![TransportKind::Ssh]);
    assert_eq!(ssh.opened(), 0);
    assert_eq!(outcome.exit_code(), 3);
    assert!(outcome.diagnostic.unwrap().contains("Permission denied"));
    assert!(mosh.all_closed());
}

#[tokio::test]
async fn test_host_key_rejection_on_last_candidate_aborts() {
    let mosh = FakeBackend::new(
        TransportKind::Mosh,
        Establish::Fail(TransportError::Refused("connection refused".into())),
    );
    let ssh = FakeBackend::new(
        TransportKind::Ssh,
        Establish::Fail(TransportError::HostKeyRejected("REMOTE HOST IDENTIFICATION HAS CHANGED".into())),
    );
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["mosh", "ssh"]"#, 5),
        registry(&mosh, &ssh),
        Arc::new(FakeMultiplexer::new()),
    );

    let outcome = orchestrator.connect("box1").await.unwrap();

    assert_eq!(
        outcome.status,
        SessionStatus::Aborted {
            reason: AbortReason::Failure(FailureKind::HostKeyRejected)
        }
    );
    assert_eq!(outcome.attempts.len(), 2);
    assert!(outcome.not_attempted.is_empty());
}

#[tokio::test]
async fn test_all_refused_exhausts_plan() {
    let refused = || Establish::Fail(TransportError::Refused("connection refused".into()));
    let mosh = FakeBackend::new(TransportKind::Mosh, refused());
    let ssh = FakeBackend::new(TransportKind::Ssh, refused());
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["mosh", "ssh"]"#, 5),
        registry(&mosh, &ssh),
        Arc::new(FakeMultiplexer::new()),
    );

    let outcome = orchestrator.connect("box1").await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Exhausted);
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(outcome.transport, None);
    assert_eq!(outcome.exit_code(), 2);
    assert!(outcome.diagnostic.is_some());
    assert!(mosh.all_closed() && ssh.all_closed());
}

#[tokio::test]
async fn test_multiplexer_unavailable_everywhere() {
    let mosh = FakeBackend::new(TransportKind::Mosh, Establish::Connect);
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let multiplexer = Arc::new(FakeMultiplexer::unavailable());
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["mosh", "ssh"]"#, 5),
        registry(&mosh, &ssh),
        multiplexer.clone(),
    );

    let outcome = orchestrator.connect("box1").await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Exhausted);
    assert_eq!(
        outcomes(&outcome),
        vec![
            (
                TransportKind::Mosh,
                AttemptOutcome::Failed(FailureKind::MultiplexerUnavailable)
            ),
            (
                TransportKind::Ssh,
                AttemptOutcome::Failed(FailureKind::MultiplexerUnavailable)
            ),
        ]
    );
    assert!(outcome.diagnostic.unwrap().contains("tmux"));
    assert_eq!(multiplexer.calls().len(), 2);
    assert!(mosh.all_closed() && ssh.all_closed());
}

#[tokio::test]
async fn test_multiplexer_failure_falls_back_to_next_transport() {
    let mosh = FakeBackend::new(TransportKind::Mosh, Establish::Connect);
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let multiplexer = Arc::new(FakeMultiplexer::new().with_session("box1").failing_on(
        TransportKind::Mosh,
        MultiplexerError::Unavailable("tmux: command not found".into()),
    ));
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["mosh", "ssh"]"#, 5),
        registry(&mosh, &ssh),
        multiplexer.clone(),
    );

    let outcome = orchestrator.connect("box1").await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Attached);
    assert_eq!(outcome.transport, Some(TransportKind::Ssh));
    assert!(!outcome.created);
    assert_eq!(
        outcomes(&outcome),
        vec![
            (
                TransportKind::Mosh,
                AttemptOutcome::Failed(FailureKind::MultiplexerUnavailable)
            ),
            (TransportKind::Ssh, AttemptOutcome::Connected),
        ]
    );
    assert_eq!(multiplexer.calls(), vec!["attach box1", "attach box1"]);
    assert_eq!(outcome.exit_code(), 0);
    assert!(mosh.all_closed() && ssh.all_closed());
}

#[tokio::test]
async fn test_auth_failure_during_attach_aborts() {
    let mosh = FakeBackend::new(TransportKind::Mosh, Establish::Connect);
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let multiplexer = Arc::new(FakeMultiplexer::new().with_session("box1").failing_on(
        TransportKind::Mosh,
        MultiplexerError::Transport(TransportError::AuthFailed(
            "Permission denied (publickey)".into(),
        )),
    ));
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["mosh", "ssh"]"#, 5),
        registry(&mosh, &ssh),
        multiplexer.clone(),
    );

    let outcome = orchestrator.connect("box1").await.unwrap();

    assert_eq!(
        outcome.status,
        SessionStatus::Aborted {
            reason: AbortReason::Failure(FailureKind::AuthFailed)
        }
    );
    assert_eq!(
        outcomes(&outcome),
        vec![(TransportKind::Mosh, AttemptOutcome::Failed(FailureKind::AuthFailed))]
    );
    assert_eq!(outcome.not_attempted, vec![TransportKind::Ssh]);
    assert_eq!(ssh.opened(), 0);
    assert_eq!(multiplexer.calls(), vec!["attach box1"]);
    assert_eq!(outcome.exit_code(), 3);
    assert!(mosh.all_closed());
}

#[tokio::test]
async fn test_missing_backend_is_retryable() {
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["mosh", "ssh"]"#, 5),
        BackendRegistry::new().with(ssh.clone()),
        Arc::new(FakeMultiplexer::new().with_session("box1")),
    );

    let outcome = orchestrator.connect("box1").await.unwrap();

    assert!(outcome.is_attached());
    assert_eq!(
        outcomes(&outcome),
        vec![
            (TransportKind::Mosh, AttemptOutcome::Failed(FailureKind::Other)),
            (TransportKind::Ssh, AttemptOutcome::Connected),
        ]
    );
}

#[tokio::test]
async fn test_open_failure_is_recorded() {
    let mosh = FakeBackend::failing_open(
        TransportKind::Mosh,
        TransportError::Other("mosh is not supported on Windows".into()),
    );
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["mosh", "ssh"]"#, 5),
        registry(&mosh, &ssh),
        Arc::new(FakeMultiplexer::new().with_session("box1")),
    );

    let outcome = orchestrator.connect("box1").await.unwrap();

    assert!(outcome.is_attached());
    assert_eq!(mosh.opened(), 0);
    assert_eq!(
        outcome.attempts[0].diagnostic.as_deref(),
        Some("mosh is not supported on Windows")
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_establish() {
    let mosh = FakeBackend::new(TransportKind::Mosh, Establish::Hang);
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let cancel = CancellationToken::new();
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["mosh", "ssh"]"#, 30),
        registry(&mosh, &ssh),
        Arc::new(FakeMultiplexer::new()),
    )
    .with_cancellation(cancel.clone());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });
    let outcome = orchestrator.connect("box1").await.unwrap();
    trigger.await.unwrap();

    assert_eq!(
        outcome.status,
        SessionStatus::Aborted {
            reason: AbortReason::Cancelled
        }
    );
    assert_eq!(
        outcomes(&outcome),
        vec![(TransportKind::Mosh, AttemptOutcome::Cancelled)]
    );
    assert_eq!(outcome.not_attempted, vec![TransportKind::Ssh]);
    assert_eq!(outcome.exit_code(), 130);
    assert_eq!(mosh.opened(), 1);
    assert!(mosh.all_closed());
    assert_eq!(ssh.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_while_attached() {
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let cancel = CancellationToken::new();
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["ssh"]"#, 5),
        BackendRegistry::new().with(ssh.clone()),
        Arc::new(FakeMultiplexer::hanging()),
    )
    .with_cancellation(cancel.clone());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();
    });
    let outcome = orchestrator.connect("box1").await.unwrap();
    trigger.await.unwrap();

    assert_eq!(
        outcome.status,
        SessionStatus::Aborted {
            reason: AbortReason::Cancelled
        }
    );
    assert_eq!(outcome.diagnostic.as_deref(), Some("cancelled"));
    assert!(ssh.all_closed());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["ssh"]"#, 5),
        BackendRegistry::new().with(ssh.clone()),
        Arc::new(FakeMultiplexer::new()),
    );
    orchestrator.cancellation_token().cancel();

    let outcome = orchestrator.connect("box1").await.unwrap();

    assert!(outcome.attempts.is_empty());
    assert_eq!(outcome.not_attempted, vec![TransportKind::Ssh]);
    assert_eq!(ssh.opened(), 0);
}

#[tokio::test]
async fn test_unknown_profile() {
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["ssh"]"#, 5),
        BackendRegistry::new().with(ssh.clone()),
        Arc::new(FakeMultiplexer::new()),
    );

    let err = orchestrator.connect("nope").await.unwrap_err();
    assert_eq!(err, ProfileError::NotFound("nope".to_string()));
    assert_eq!(ssh.opened(), 0);
}

#[tokio::test]
async fn test_session_record_lives_while_attached() {
    let dir = tempfile::tempdir().unwrap();
    let sessions = dir.path().join("sessions");
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let multiplexer = Arc::new(
        FakeMultiplexer::new()
            .with_session("box1")
            .watching_records(sessions.clone()),
    );
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["ssh"]"#, 5),
        BackendRegistry::new().with(ssh.clone()),
        multiplexer.clone(),
    )
    .with_session_locks(&sessions);

    let outcome = orchestrator.connect("box1").await.unwrap();

    assert!(outcome.is_attached());
    assert_eq!(multiplexer.records_seen(), vec![1]);
    assert_eq!(std::fs::read_dir(&sessions).unwrap().count(), 0);
}

#[tokio::test]
async fn test_repeated_runs_are_independent() {
    let ssh = FakeBackend::new(TransportKind::Ssh, Establish::Connect);
    let orchestrator = SessionOrchestrator::new(
        store_with_order(r#"["ssh"]"#, 5),
        BackendRegistry::new().with(ssh.clone()),
        Arc::new(FakeMultiplexer::new().with_session("box1")),
    );

    let first = orchestrator.connect("box1").await.unwrap();
    let second = orchestrator.connect("box1").await.unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(outcomes(&first), outcomes(&second));
    assert_eq!(ssh.opened(), 2);
    assert!(ssh.all_closed());
}
