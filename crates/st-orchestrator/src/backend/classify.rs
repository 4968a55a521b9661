//! Map OpenSSH and mosh diagnostics onto transport errors

use st_core::TransportError;

/// Classify the stderr of a failed `ssh` invocation
pub fn classify_ssh_stderr(stderr: &str) -> TransportError {
    let message = last_meaningful_line(stderr);
    let lower = stderr.to_ascii_lowercase();

    if lower.contains("host key verification failed")
        || lower.contains("remote host identification has changed")
        || lower.contains("no matching host key type")
    {
        TransportError::HostKeyRejected(message)
    } else if lower.contains("permission denied")
        || lower.contains("too many authentication failures")
        || lower.contains("no supported authentication methods")
    {
        TransportError::AuthFailed(message)
    } else if lower.contains("connection refused") {
        TransportError::Refused(message)
    } else if lower.contains("timed out") || lower.contains("timeout") {
        TransportError::Timeout(message)
    } else if message.is_empty() {
        TransportError::Other("ssh exited without a diagnostic".to_string())
    } else {
        TransportError::Other(message)
    }
}

/// The last non-empty line, which is where OpenSSH puts the reason
fn last_meaningful_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("Warning: Permanently added"))
        .last()
        .unwrap_or_default()
        .to_string()
}
