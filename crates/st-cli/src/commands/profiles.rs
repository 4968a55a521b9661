//! Profile management commands

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use st_core::{Profile, ProfileStore, TransportCandidate, TransportKind};
use st_core::config::{ProfileEntry, ProfileFile};

use crate::output::{
    format_plan, format_profile, format_profiles, print_info, print_success, print_warning,
};

/// Execute the list command
pub fn list_command(store: &ProfileStore, tag: Option<&str>) -> Result<()> {
    let profiles: Vec<_> = match tag {
        Some(tag) => store
            .list()
            .into_iter()
            .filter(|(_, result)| matches!(result, Ok(p) if p.has_tag(tag)))
            .collect(),
        None => store.list(),
    };

    println!("{}", format_profiles(&profiles));

    let invalid = profiles.iter().filter(|(_, r)| r.is_err()).count();
    if invalid > 0 {
        print_warning(&format!(
            "{} invalid profile(s); run `sshtie show <name>` for details",
            invalid
        ));
    }
    Ok(())
}

#[derive(Serialize)]
struct ShowReport<'a> {
    profile: &'a Profile,
    plan: Vec<&'a TransportCandidate>,
}

/// Execute the show command: the resolved profile and its transport plan
pub fn show_command(store: &ProfileStore, name: &str, json: bool) -> Result<()> {
    let profile = store.resolve(name)?;
    let plan = st_orchestrator::plan(&profile);

    if json {
        let report = ShowReport {
            profile: &profile,
            plan: plan.remaining().collect(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize profile")?
        );
        return Ok(());
    }

    print!("{}", format_profile(&profile));
    println!();
    println!("Transport plan:");
    println!("{}", format_plan(&plan));
    Ok(())
}

/// Timeout for new profiles when neither the command line nor `[defaults]` sets one
const NEW_PROFILE_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute the add command
///
/// Fields left out on the command line fall back to the file's `[defaults]`,
/// then to mosh-before-ssh and a 10 second timeout.
pub fn add_command(path: &Path, mut entry: ProfileEntry) -> Result<()> {
    let mut file = load_file(path)?;
    let store = file
        .to_store()
        .with_context(|| format!("Failed to load profiles from {}", path.display()))?;
    let defaults = store.defaults();
    if entry.transport_order.is_none() && defaults.transport_order.is_none() {
        entry.transport_order = Some(TransportKind::ALL.to_vec());
    }
    if entry.connect_timeout.is_none() && defaults.connect_timeout.is_none() {
        entry.connect_timeout = Some(NEW_PROFILE_TIMEOUT);
    }
    let profile = file.add(entry).context("Failed to add profile")?;
    file.save()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    print_success(&format!(
        "Added profile {} ({}, tmux session {:?})",
        profile.name,
        profile.target(),
        profile.tmux_session
    ));
    Ok(())
}

/// Execute the remove command
pub fn remove_command(path: &Path, name: &str) -> Result<()> {
    let mut file = load_file(path)?;
    file.remove(name).context("Failed to remove profile")?;
    file.save()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    print_success(&format!("Removed profile {}", name));
    Ok(())
}

/// Execute the rename command
pub fn rename_command(path: &Path, from: &str, to: &str) -> Result<()> {
    let mut file = load_file(path)?;
    file.rename(from, to).context("Failed to rename profile")?;
    file.save()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    print_success(&format!("Renamed profile {} to {}", from, to));
    Ok(())
}

/// Execute the copy command
pub fn copy_command(path: &Path, from: &str, to: &str) -> Result<()> {
    let mut file = load_file(path)?;
    file.copy(from, to).context("Failed to copy profile")?;
    file.save()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    print_success(&format!("Copied profile {} to {}", from, to));
    Ok(())
}

/// Editor used by `sshtie edit`: `$VISUAL`, then `$EDITOR`, then a platform default
pub fn default_editor() -> String {
    ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| if cfg!(windows) { "notepad" } else { "nano" }.to_string())
}

/// Execute the edit command
///
/// The entry is edited as TOML in a temporary file and only written back
/// if it still validates; the profile keeps its name.
pub fn edit_command(path: &Path, name: &str, editor: &str) -> Result<()> {
    let mut file = load_file(path)?;
    let original = file.entry_toml(name).context("Failed to open profile")?;

    let mut scratch = tempfile::Builder::new()
        .prefix("sshtie-")
        .suffix(".toml")
        .tempfile()
        .context("Failed to create temporary file")?;
    scratch
        .write_all(original.as_bytes())
        .and_then(|_| scratch.flush())
        .context("Failed to write temporary file")?;

    run_editor(editor, scratch.path())?;

    let edited = std::fs::read_to_string(scratch.path()).context("Failed to read edited profile")?;
    if edited == original {
        print_info(&format!("Profile {} unchanged", name));
        return Ok(());
    }

    let profile = file
        .replace(name, &edited)
        .with_context(|| format!("Edited profile rejected, {} left unchanged", path.display()))?;
    file.save()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    print_success(&format!("Updated profile {} ({})", profile.name, profile.target()));
    Ok(())
}

fn run_editor(editor: &str, file: &Path) -> Result<()> {
    let mut parts = editor.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("No editor configured; set $EDITOR"))?;

    tracing::debug!("Opening {} with {}", file.display(), editor);
    let status = std::process::Command::new(program)
        .args(parts)
        .arg(file)
        .status()
        .with_context(|| format!("Failed to start editor {:?}", program))?;
    if !status.success() {
        bail!("Editor {:?} exited with {}", program, status);
    }
    Ok(())
}

fn load_file(path: &Path) -> Result<ProfileFile> {
    ProfileFile::load(path).with_context(|| format!("Failed to load profiles from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ProfileEntry {
        ProfileEntry {
            name: name.to_string(),
            host: "10.0.0.5".to_string(),
            user: Some("deploy".to_string()),
            connect_timeout: Some(Duration::from_secs(10)),
            transport_order: Some(vec![TransportKind::Ssh]),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_rename_copy_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");

        add_command(&path, entry("box1")).unwrap();
        rename_command(&path, "box1", "box2").unwrap();
        copy_command(&path, "box2", "box3").unwrap();
        remove_command(&path, "box2").unwrap();

        let store = ProfileStore::load(&path).unwrap();
        assert_eq!(store.names(), vec!["box3"]);
        assert_eq!(store.resolve("box3").unwrap().tmux_session, "box3");
    }

    #[test]
    fn test_add_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");

        let entry = ProfileEntry {
            name: "bare".to_string(),
            host: "example.com".to_string(),
            ..Default::default()
        };
        add_command(&path, entry).unwrap();

        let profile = ProfileStore::load(&path).unwrap().resolve("bare").unwrap();
        assert_eq!(profile.transport_order, vec![TransportKind::Mosh, TransportKind::Ssh]);
        assert_eq!(profile.connect_timeout, NEW_PROFILE_TIMEOUT);
    }

    #[test]
    fn test_add_duplicate_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");

        add_command(&path, entry("box1")).unwrap();
        let err = add_command(&path, entry("box1")).unwrap_err();
        assert_eq!(crate::exit::for_error(&err), crate::exit::FAILURE);
        assert!(format!("{:#}", err).contains("already exists"));
    }

    #[cfg(unix)]
    #[test]
    fn test_edit_through_editor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        add_command(&path, entry("box1")).unwrap();

        let script = dir.path().join("editor.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nsed 's/10.0.0.5/10.0.0.9/' \"$1\" > \"$1.new\" && mv \"$1.new\" \"$1\"\n",
        )
        .unwrap();
        make_executable(&script);

        edit_command(&path, "box1", &script.display().to_string()).unwrap();
        let profile = ProfileStore::load(&path).unwrap().resolve("box1").unwrap();
        assert_eq!(profile.host, "10.0.0.9");
    }

    #[cfg(unix)]
    #[test]
    fn test_invalid_edit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        add_command(&path, entry("box1")).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let script = dir.path().join("editor.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'port = 70000' >> \"$1\"\n").unwrap();
        make_executable(&script);

        let err = edit_command(&path, "box1", &script.display().to_string()).unwrap_err();
        assert_eq!(crate::exit::for_error(&err), crate::exit::PROFILE_INVALID);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_edit_unknown_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        let err = edit_command(&path, "nope", "true").unwrap_err();
        assert_eq!(crate::exit::for_error(&err), crate::exit::PROFILE_NOT_FOUND);
    }

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_show_unknown_profile() {
        let store = ProfileStore::from_toml_str("").unwrap();
        let err = show_command(&store, "nope", false).unwrap_err();
        assert_eq!(crate::exit::for_error(&err), crate::exit::PROFILE_NOT_FOUND);
    }
}
