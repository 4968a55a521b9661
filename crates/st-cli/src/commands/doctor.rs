//! Doctor command implementation
//!
//! Checks everything a connection needs, from local binaries to the remote
//! tmux, without attaching to anything.

use std::time::Duration;

use anyhow::Result;

use st_core::config::serde_utils::format_duration;
use st_core::config::NetworkMode;
use st_core::{
    tailscale, Profile, ProfileStore, RemoteCommand, TransportBackend, TransportCandidate,
    TransportHandle, TransportKind,
};
use st_orchestrator::backend::SshBackend;

use crate::exit;
use crate::output::{format_checks, format_plan, print_info, CheckResult};

/// Upper bound for the TCP reachability check
const TCP_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Execute the doctor command
///
/// Exits non-zero when `ssh` is missing locally or the host is unreachable.
pub async fn doctor_command(store: &ProfileStore, name: &str) -> Result<i32> {
    let profile = store.resolve(name)?;
    print_info(&format!("Diagnosing {} ({})", profile.name, profile.target()));

    let ssh_binary = local_binary("ssh");
    let mosh_client = if cfg!(windows) {
        CheckResult::skipped("mosh-client", "not supported on Windows")
    } else {
        local_binary("mosh-client")
    };
    let reachable = tcp_check(&profile).await;

    let mut checks = vec![ssh_binary.clone(), mosh_client.clone(), reachable.clone()];

    let remote = if !ssh_binary.passed() {
        RemoteChecks::skipped("ssh not installed")
    } else if !reachable.passed() {
        RemoteChecks::skipped("host unreachable")
    } else {
        remote_checks(&profile).await
    };
    let tmux = remote.tmux.passed();
    let mosh_server = remote.mosh_server.passed();
    checks.extend([remote.login, remote.tmux, remote.mosh_server]);

    checks.extend(tailscale_checks(&profile.host));

    println!("{}", format_checks(&checks));

    let mosh = mosh_client.passed() && mosh_server && profile.network != NetworkMode::Direct;
    let strategy = match (mosh, tmux) {
        (true, true) => "mosh + tmux",
        (false, true) => "ssh + tmux",
        _ => "ssh only",
    };
    println!("Recommended strategy: {}", strategy);
    println!();
    println!("Transport plan:");
    println!("{}", format_plan(&st_orchestrator::plan(&profile)));

    if ssh_binary.passed() && reachable.passed() {
        Ok(exit::SUCCESS)
    } else {
        Ok(exit::FAILURE)
    }
}

fn local_binary(name: &str) -> CheckResult {
    match which::which(name) {
        Ok(path) => CheckResult::pass(name, path.display().to_string()),
        Err(_) => CheckResult::fail(name, "not found in PATH"),
    }
}

async fn tcp_check(profile: &Profile) -> CheckResult {
    let label = format!("TCP {}", profile.port);
    let wait = TCP_CHECK_TIMEOUT.min(profile.connect_timeout);
    let connect = tokio::net::TcpStream::connect((profile.host.as_str(), profile.port));
    match tokio::time::timeout(wait, connect).await {
        Ok(Ok(_)) => CheckResult::pass(label, "reachable"),
        Ok(Err(e)) => CheckResult::fail(label, e.to_string()),
        Err(_) => CheckResult::fail(label, format!("no answer within {}", format_duration(&wait))),
    }
}

/// Rows for the remote side of the connection
struct RemoteChecks {
    login: CheckResult,
    tmux: CheckResult,
    mosh_server: CheckResult,
}

impl RemoteChecks {
    fn skipped(reason: &str) -> Self {
        Self {
            login: CheckResult::skipped("ssh login", reason),
            tmux: CheckResult::skipped("tmux", "no login"),
            mosh_server: CheckResult::skipped("mosh-server", "no login"),
        }
    }

    fn login_failed(detail: String) -> Self {
        Self {
            login: CheckResult::fail("ssh login", detail),
            ..Self::skipped("")
        }
    }
}

/// Log in over ssh and look for tmux and mosh-server
async fn remote_checks(profile: &Profile) -> RemoteChecks {
    let candidate = TransportCandidate::from_profile(profile, TransportKind::Ssh);
    let mut handle = match SshBackend::new().open(&candidate).await {
        Ok(handle) => handle,
        Err(e) => return RemoteChecks::login_failed(e.to_string()),
    };

    let checks = match tokio::time::timeout(candidate.timeout, handle.establish()).await {
        Err(_) => RemoteChecks::login_failed(format!(
            "no connection within {}",
            format_duration(&candidate.timeout)
        )),
        Ok(Err(e)) => RemoteChecks::login_failed(e.to_string()),
        Ok(Ok(())) => {
            let server = profile.mosh_server.as_deref().unwrap_or("mosh-server");
            RemoteChecks {
                login: CheckResult::pass("ssh login", "OK"),
                tmux: remote_probe(handle.as_mut(), "tmux", RemoteCommand::new(["tmux", "-V"]))
                    .await,
                mosh_server: remote_probe(
                    handle.as_mut(),
                    "mosh-server",
                    RemoteCommand::new(["command", "-v", server]),
                )
                .await,
            }
        }
    };

    handle.close().await;
    checks
}

async fn remote_probe(
    handle: &mut dyn TransportHandle,
    label: &str,
    command: RemoteCommand,
) -> CheckResult {
    match handle.exec(&command).await {
        Ok(output) if output.success() => {
            let detail = output.stdout.trim();
            CheckResult::pass(label, if detail.is_empty() { "installed" } else { detail })
        }
        Ok(_) => CheckResult::fail(label, "not found on remote"),
        Err(e) => CheckResult::fail(label, e.to_string()),
    }
}

fn tailscale_checks(host: &str) -> Vec<CheckResult> {
    match tailscale::status() {
        Ok(Some(state)) if state.running => {
            let server = if state.contains_host(host) {
                CheckResult::pass("Tailscale (host)", "in the tailnet")
            } else {
                CheckResult::fail("Tailscale (host)", "not in the tailnet")
            };
            vec![
                CheckResult::pass("Tailscale (client)", format!("running on {}", state.tailnet)),
                server,
            ]
        }
        Ok(Some(_)) => vec![
            CheckResult::fail("Tailscale (client)", "installed but not running"),
            CheckResult::skipped("Tailscale (host)", "client not running"),
        ],
        Ok(None) => vec![
            CheckResult::skipped("Tailscale (client)", "not installed (optional)"),
            CheckResult::skipped("Tailscale (host)", "client not installed"),
        ],
        Err(e) => vec![
            CheckResult::fail("Tailscale (client)", e.to_string()),
            CheckResult::skipped("Tailscale (host)", "client status unknown"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_login_skips_remote_tools() {
        let remote = RemoteChecks::login_failed("Permission denied (publickey)".into());
        assert_eq!(remote.login.status, crate::output::CheckStatus::Fail);
        assert_eq!(remote.tmux.status, crate::output::CheckStatus::Skipped);
        assert!(!remote.mosh_server.passed());
    }

    #[test]
    fn test_local_binary_missing() {
        let check = local_binary("sshtie-no-such-binary");
        assert_eq!(check.status, crate::output::CheckStatus::Fail);
        assert_eq!(check.detail, "not found in PATH");
    }

    #[tokio::test]
    async fn test_tcp_check_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let store = ProfileStore::from_toml_str(&format!(
            "[[profiles]]\nname = \"local\"\nhost = \"127.0.0.1\"\nport = {}\ntransport_order = [\"ssh\"]\nconnect_timeout = 2\n",
            port
        ))
        .unwrap();
        let check = tcp_check(&store.resolve("local").unwrap()).await;
        assert!(!check.passed());
    }

    #[tokio::test]
    async fn test_tcp_check_open() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let store = ProfileStore::from_toml_str(&format!(
            "[[profiles]]\nname = \"local\"\nhost = \"127.0.0.1\"\nport = {}\ntransport_order = [\"ssh\"]\nconnect_timeout = 2\n",
            port
        ))
        .unwrap();
        let check = tcp_check(&store.resolve("local").unwrap()).await;
        assert!(check.passed());
    }
}
