//! Output formatting utilities for the CLI
//!
//! Tables for profiles, transport plans, audit trails and active sessions,
//! plus colored status lines.

use std::time::{SystemTime, UNIX_EPOCH};

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use st_core::config::serde_utils::format_duration;
use st_core::session_lock::SessionRecord;
use st_core::{Profile, ProfileError, TransportKind};
use st_orchestrator::{TransportAttempt, TransportPlan};

/// Format the profile list as an ASCII table
///
/// Entries that fail validation stay in the table with the error in place
/// of the host so a broken file is visible at a glance.
pub fn format_profiles(profiles: &[(String, Result<Profile, ProfileError>)]) -> String {
    if profiles.is_empty() {
        return "No profiles yet. Run: sshtie add --name <name> --host <host>".to_string();
    }

    #[derive(Tabled)]
    struct ProfileRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "USER")]
        user: String,
        #[tabled(rename = "PORT")]
        port: String,
        #[tabled(rename = "TRANSPORTS")]
        transports: String,
        #[tabled(rename = "SESSION")]
        session: String,
        #[tabled(rename = "TAGS")]
        tags: String,
    }

    let rows: Vec<ProfileRow> = profiles
        .iter()
        .map(|(name, result)| match result {
            Ok(p) => ProfileRow {
                name: name.clone(),
                host: p.host.clone(),
                user: p.user.clone().unwrap_or_else(|| "-".to_string()),
                port: p.port.to_string(),
                transports: join_transports(&p.transport_order),
                session: p.tmux_session.clone(),
                tags: if p.tags.is_empty() {
                    "-".to_string()
                } else {
                    p.tags.join(", ")
                },
            },
            Err(e) => ProfileRow {
                name: name.clone(),
                host: format!("invalid: {}", invalid_field(e)),
                user: "-".to_string(),
                port: "-".to_string(),
                transports: "-".to_string(),
                session: "-".to_string(),
                tags: "-".to_string(),
            },
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(120))
        .to_string()
}

fn invalid_field(e: &ProfileError) -> String {
    match e {
        ProfileError::Invalid { field, .. } => format!("`{}`", field),
        other => other.to_string(),
    }
}

/// Format one resolved profile as `key: value` lines
pub fn format_profile(profile: &Profile) -> String {
    let mut output = String::new();

    output.push_str(&format!("Profile: {}\n", profile.name));
    output.push_str(&format!("Target: {}\n", profile.target()));
    output.push_str(&format!(
        "Transports: {}\n",
        join_transports(&profile.transport_order)
    ));
    output.push_str(&format!("tmux session: {}\n", profile.tmux_session));
    output.push_str(&format!(
        "Connect timeout: {}\n",
        format_duration(&profile.connect_timeout)
    ));
    output.push_str(&format!("Network: {:?}\n", profile.network));
    if let Some(key) = &profile.key {
        output.push_str(&format!("Key: {}\n", key.display()));
    }
    if let Some(server) = &profile.mosh_server {
        output.push_str(&format!("mosh-server: {}\n", server));
    }
    if !profile.tags.is_empty() {
        output.push_str(&format!("Tags: {}\n", profile.tags.join(", ")));
    }
    for kind in TransportKind::ALL {
        let extra = profile.extra_args.for_transport(kind);
        if !extra.is_empty() {
            output.push_str(&format!("Extra {} args: {}\n", kind, extra.join(" ")));
        }
    }

    output
}

/// Format a transport plan as an ASCII table
pub fn format_plan(plan: &TransportPlan) -> String {
    if plan.is_empty() {
        return "No transports to try".to_string();
    }

    #[derive(Tabled)]
    struct PlanRow {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "TRANSPORT")]
        transport: String,
        #[tabled(rename = "TARGET")]
        target: String,
        #[tabled(rename = "TIMEOUT")]
        timeout: String,
        #[tabled(rename = "EXTRA ARGS")]
        extra: String,
    }

    let rows: Vec<PlanRow> = plan
        .remaining()
        .enumerate()
        .map(|(i, c)| PlanRow {
            index: i + 1,
            transport: c.transport.to_string(),
            target: c.target.to_string(),
            timeout: format_duration(&c.timeout),
            extra: if c.extra_args.is_empty() {
                "-".to_string()
            } else {
                c.extra_args.join(" ")
            },
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the audit trail of one run
pub fn format_attempts(attempts: &[TransportAttempt]) -> String {
    if attempts.is_empty() {
        return "No transports attempted".to_string();
    }

    #[derive(Tabled)]
    struct AttemptRow {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "TRANSPORT")]
        transport: String,
        #[tabled(rename = "TARGET")]
        target: String,
        #[tabled(rename = "RESULT")]
        result: String,
        #[tabled(rename = "ELAPSED")]
        elapsed: String,
        #[tabled(rename = "DETAIL")]
        detail: String,
    }

    let rows: Vec<AttemptRow> = attempts
        .iter()
        .enumerate()
        .map(|(i, a)| AttemptRow {
            index: i + 1,
            transport: a.transport.to_string(),
            target: a.target.to_string(),
            result: a.outcome.to_string(),
            elapsed: format_elapsed(a.elapsed_ms),
            detail: a
                .diagnostic
                .as_deref()
                .map(|d| truncate(d, 60))
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(120))
        .to_string()
}

/// Format active session records as an ASCII table
pub fn format_sessions(records: &[SessionRecord]) -> String {
    if records.is_empty() {
        return "No active sessions".to_string();
    }

    #[derive(Tabled)]
    struct SessionRow {
        #[tabled(rename = "PROFILE")]
        profile: String,
        #[tabled(rename = "SESSION")]
        session: String,
        #[tabled(rename = "TRANSPORT")]
        transport: String,
        #[tabled(rename = "PID")]
        pid: u32,
        #[tabled(rename = "UP")]
        up: String,
    }

    let now = unix_millis();
    let rows: Vec<SessionRow> = records
        .iter()
        .map(|r| SessionRow {
            profile: r.profile.clone(),
            session: r.session.clone(),
            transport: r.transport.to_string(),
            pid: r.pid,
            up: format_age(now.saturating_sub(r.started_at) / 1000),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Result of one `doctor` check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub label: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

impl CheckResult {
    pub fn pass(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(label, CheckStatus::Pass, detail)
    }

    pub fn fail(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(label, CheckStatus::Fail, detail)
    }

    pub fn skipped(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(label, CheckStatus::Skipped, detail)
    }

    fn new(label: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status,
            detail: detail.into(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Pass
    }
}

/// Format doctor checks as an ASCII table
pub fn format_checks(checks: &[CheckResult]) -> String {
    #[derive(Tabled)]
    struct CheckRow {
        #[tabled(rename = "CHECK")]
        label: String,
        #[tabled(rename = "STATUS")]
        status: &'static str,
        #[tabled(rename = "DETAIL")]
        detail: String,
    }

    let rows: Vec<CheckRow> = checks
        .iter()
        .map(|c| CheckRow {
            label: c.label.clone(),
            status: match c.status {
                CheckStatus::Pass => "ok",
                CheckStatus::Fail => "FAIL",
                CheckStatus::Skipped => "skipped",
            },
            detail: truncate(&c.detail, 70),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

fn join_transports(order: &[TransportKind]) -> String {
    order
        .iter()
        .map(TransportKind::as_str)
        .collect::<Vec<_>>()
        .join(" → ")
}

fn format_elapsed(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

/// Format an age in seconds in human-readable form
fn format_age(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow, to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("→ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use st_core::ProfileStore;

    fn store() -> ProfileStore {
        ProfileStore::from_toml_str(
            r#"
[defaults]
transport_order = ["mosh", "ssh"]
connect_timeout = 10

[[profiles]]
name = "box1"
host = "10.0.0.5"
user = "deploy"
tags = ["lab"]

[[profiles]]
name = "broken"
host = "h"
port = 0
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_format_profiles_flags_invalid_entries() {
        let table = format_profiles(&store().list());
        assert!(table.contains("box1"));
        assert!(table.contains("mosh → ssh"));
        assert!(table.contains("lab"));
        assert!(table.contains("invalid: `port`"));
    }

    #[test]
    fn test_format_plan_lists_candidates_in_order() {
        let profile = store().resolve("box1").unwrap();
        let table = format_plan(&st_orchestrator::plan(&profile));
        let mosh = table.find("mosh").unwrap();
        let ssh = table.find("ssh").unwrap();
        assert!(mosh < ssh);
        assert!(table.contains("deploy@10.0.0.5:22"));
    }

    #[test]
    fn test_empty_tables() {
        assert_eq!(format_sessions(&[]), "No active sessions");
        assert_eq!(format_attempts(&[]), "No transports attempted");
        assert!(format_profiles(&[]).contains("sshtie add"));
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(42), "42s");
        assert_eq!(format_age(125), "2m 5s");
        assert_eq!(format_age(7260), "2h 1m");
        assert_eq!(format_age(90000), "1d 1h");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }
}
