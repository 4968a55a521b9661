//! Status command implementation

use std::path::Path;

use anyhow::{Context, Result};

use st_core::session_lock;

use crate::output::format_sessions;

/// Execute the status command: sessions with a live local process
pub fn status_command(sessions_dir: &Path, json: bool) -> Result<()> {
    let records = session_lock::list_active(sessions_dir)
        .with_context(|| format!("Failed to read session records in {}", sessions_dir.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialize sessions")?
        );
    } else {
        println!("{}", format_sessions(&records));
    }
    Ok(())
}
