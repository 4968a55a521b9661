//! Managed block of `Host` entries in `~/.ssh/config`
//!
//! Lets tools that only read OpenSSH config (editor Remote-SSH pickers,
//! `scp`, plain `ssh box1`) see the same profiles. Everything outside the
//! markers belongs to the user and is left as it was.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::{
    write_private, Profile, DEFAULT_CONNECTION_ATTEMPTS, DEFAULT_PORT,
    DEFAULT_SERVER_ALIVE_COUNT_MAX, DEFAULT_SERVER_ALIVE_INTERVAL,
};
use crate::error::ConfigError;

/// First line of the managed block
pub const BLOCK_BEGIN: &str = "# BEGIN sshtie managed (do not edit this block manually)";

/// Last line of the managed block
pub const BLOCK_END: &str = "# END sshtie managed";

/// Prefix shared by every begin marker sshtie has written
const BEGIN_PREFIX: &str = "# BEGIN sshtie managed";

/// `~/.ssh/config`
pub fn default_ssh_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("config"))
}

/// The managed block for `profiles`, markers included
pub fn render_block(profiles: &[Profile]) -> String {
    let mut block = String::new();
    block.push_str(BLOCK_BEGIN);
    block.push('\n');
    for profile in profiles {
        block.push('\n');
        block.push_str(&host_entry(profile));
    }
    block.push_str(BLOCK_END);
    block.push('\n');
    block
}

fn host_entry(profile: &Profile) -> String {
    let options = &profile.ssh_options;
    let mut entry = String::new();
    let _ = writeln!(entry, "Host {}", profile.name);
    let _ = writeln!(entry, "  HostName {}", profile.host);
    if let Some(user) = &profile.user {
        let _ = writeln!(entry, "  User {}", user);
    }
    if profile.port != DEFAULT_PORT {
        let _ = writeln!(entry, "  Port {}", profile.port);
    }
    if let Some(key) = &profile.key {
        let _ = writeln!(entry, "  IdentityFile {}", key.display());
    }
    if options.forward_agent {
        entry.push_str("  ForwardAgent yes\n");
    }
    let _ = writeln!(
        entry,
        "  ServerAliveInterval {}",
        options
            .server_alive_interval
            .unwrap_or(DEFAULT_SERVER_ALIVE_INTERVAL)
    );
    let _ = writeln!(
        entry,
        "  ServerAliveCountMax {}",
        options
            .server_alive_count_max
            .unwrap_or(DEFAULT_SERVER_ALIVE_COUNT_MAX)
    );
    let _ = writeln!(
        entry,
        "  ConnectionAttempts {}",
        options
            .connection_attempts
            .unwrap_or(DEFAULT_CONNECTION_ATTEMPTS)
    );
    entry
}

/// Drop any managed block from `config`
pub fn strip_block(config: &str) -> String {
    let mut inside = false;
    let kept: Vec<&str> = config
        .lines()
        .filter(|line| {
            let line = line.trim();
            if line.starts_with(BEGIN_PREFIX) {
                inside = true;
                return false;
            }
            if line == BLOCK_END {
                inside = false;
                return false;
            }
            !inside
        })
        .collect();
    kept.join("\n")
}

/// Replace the managed block in `existing` with `block`
pub fn merge(existing: &str, block: &str) -> String {
    let user_part = strip_block(existing);
    let user_part = user_part.trim_end_matches('\n');
    if user_part.trim().is_empty() {
        block.to_string()
    } else {
        format!("{}\n\n{}", user_part, block)
    }
}

/// Rewrite the managed block of the ssh config at `path`
///
/// A missing file is created. Returns the number of hosts written.
pub fn sync(path: &Path, profiles: &[Profile]) -> Result<usize, ConfigError> {
    let existing = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    write_private(path, &merge(&existing, &render_block(profiles)))?;
    tracing::info!("Wrote {} host(s) to {}", profiles.len(), path.display());
    Ok(profiles.len())
}
