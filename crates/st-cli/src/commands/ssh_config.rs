//! ssh-config command implementation

use std::path::PathBuf;

use anyhow::{Context, Result};

use st_core::{ssh_config, ProfileStore};

use crate::output::{print_info, print_success, print_warning};

/// Execute the ssh-config command: sync valid profiles into the managed block
pub fn ssh_config_command(store: &ProfileStore, path: Option<PathBuf>) -> Result<()> {
    let mut profiles = Vec::new();
    for (name, result) in store.list() {
        match result {
            Ok(profile) => profiles.push(profile),
            Err(e) => print_warning(&format!("Skipping {}: {}", name, e)),
        }
    }
    if profiles.is_empty() {
        println!("No profiles yet. Run: sshtie add --name <name> --host <host>");
        return Ok(());
    }

    let path = match path {
        Some(path) => path,
        None => ssh_config::default_ssh_config_path()
            .context("Cannot locate the home directory for ~/.ssh/config")?,
    };
    let written = ssh_config::sync(&path, &profiles)
        .with_context(|| format!("Failed to update {}", path.display()))?;

    print_success(&format!("{} profile(s) written to {}", written, path.display()));
    for profile in &profiles {
        println!("   Host {:<20} → {}", profile.name, profile.target());
    }
    print_info("Restart your editor to refresh its SSH host list");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_invalid_profiles() {
        let store = ProfileStore::from_toml_str(
            r#"
[[profiles]]
name = "good"
host = "10.0.0.5"
transport_order = ["ssh"]
connect_timeout = 5

[[profiles]]
name = "bad"
host = "10.0.0.6"
"#,
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");

        ssh_config_command(&store, Some(path.clone())).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Host good"));
        assert!(!content.contains("Host bad"));
    }

    #[test]
    fn test_no_profiles_leaves_file_alone() {
        let store = ProfileStore::from_toml_str("").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");

        ssh_config_command(&store, Some(path.clone())).unwrap();
        assert!(!path.exists());
    }
}
