//! Connect command implementation

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio_util::sync::CancellationToken;

use st_core::config::{self, NetworkMode};
use st_core::{tailscale, Profile, ProfileStore};
use st_orchestrator::{
    AbortReason, BackendRegistry, SessionOrchestrator, SessionOutcome, SessionStatus,
    TmuxMultiplexer,
};

use crate::output::{format_attempts, print_error, print_info, print_success, print_warning};

/// Execute the connect command
///
/// Returns the exit code for the session outcome; only profile resolution
/// and the Tailscale precheck surface as errors.
pub async fn connect_command(
    store: Arc<ProfileStore>,
    name: &str,
    json: bool,
    cancel: CancellationToken,
) -> Result<i32> {
    let profile = store.resolve(name)?;
    check_network(&profile)?;

    if !json {
        print_info(&format!(
            "Connecting to {} ({}), tmux session {:?}",
            profile.name,
            profile.target(),
            profile.tmux_session
        ));
    }

    let orchestrator = SessionOrchestrator::new(
        store,
        BackendRegistry::system(),
        Arc::new(TmuxMultiplexer::new()),
    )
    .with_cancellation(cancel)
    .with_session_locks(config::default_sessions_dir());

    let outcome = orchestrator.run(&profile).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?
        );
    } else {
        report(&outcome);
    }

    Ok(outcome.exit_code())
}

/// Fail fast when a tailnet-only profile cannot be routed
pub fn check_network(profile: &Profile) -> Result<()> {
    if profile.network != NetworkMode::Tailscale {
        return Ok(());
    }

    let state = tailscale::status()
        .context("Failed to query Tailscale")?
        .ok_or_else(|| {
            anyhow!(
                "profile {:?} requires Tailscale, but it is not installed",
                profile.name
            )
        })?;
    if !state.running {
        bail!(
            "profile {:?} requires Tailscale, but it is not running (try: sudo tailscale up)",
            profile.name
        );
    }
    if !state.contains_host(&profile.host) {
        bail!(
            "{} is not in the Tailscale network {}",
            profile.host,
            state.tailnet
        );
    }
    Ok(())
}

fn report(outcome: &SessionOutcome) {
    println!("{}", format_attempts(&outcome.attempts));

    match outcome.status {
        SessionStatus::Attached => {
            let transport = outcome
                .transport
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string());
            let verb = if outcome.created { "created" } else { "reattached" };
            print_success(&format!(
                "Detached from tmux session {:?} ({} over {})",
                outcome.session, verb, transport
            ));
        }
        SessionStatus::Exhausted => {
            print_error(&format!(
                "Could not connect to {}: every transport failed",
                outcome.profile
            ));
            print_diagnostic(outcome);
        }
        SessionStatus::Aborted {
            reason: AbortReason::Failure(kind),
        } => {
            print_error(&format!("Connection to {} aborted: {}", outcome.profile, kind));
            print_diagnostic(outcome);
        }
        SessionStatus::Aborted {
            reason: AbortReason::Cancelled,
        } => {
            print_warning("Cancelled");
        }
    }

    if !outcome.not_attempted.is_empty() {
        let skipped: Vec<&str> = outcome.not_attempted.iter().map(|t| t.as_str()).collect();
        print_warning(&format!("Not attempted: {}", skipped.join(", ")));
    }
}

fn print_diagnostic(outcome: &SessionOutcome) {
    if let Some(diagnostic) = &outcome.diagnostic {
        print_error(diagnostic);
    }
}
