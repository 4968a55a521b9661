//! Editable profile file used by the management commands

use std::path::{Path, PathBuf};
use toml::{Table, Value};

use super::profile::{check_profile_name, Profile, ProfileEntry};
use super::store::{entry_name, ProfileStore};
use super::write_private;
use crate::error::{ConfigError, ProfileError, SshtieError};

/// A profile document opened for modification
///
/// Unknown content is preserved as long as it is valid TOML; only the
/// `[[profiles]]` array is rewritten.
#[derive(Debug, Clone)]
pub struct ProfileFile {
    path: PathBuf,
    document: Table,
}

impl ProfileFile {
    /// Open a profile file. A missing file starts an empty document.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let document = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Table::new(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of all entries in file order
    pub fn names(&self) -> Vec<String> {
        self.entries()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|v| v.as_table().and_then(entry_name))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Append a new profile, validated against the file's `[defaults]`
    pub fn add(&mut self, entry: ProfileEntry) -> Result<Profile, SshtieError> {
        if self.contains(&entry.name) {
            return Err(ProfileError::AlreadyExists(entry.name).into());
        }
        let table = match Value::try_from(&entry).map_err(ConfigError::from)? {
            Value::Table(table) => table,
            _ => return Err(ConfigError::Invalid("profile entry is not a table".into()).into()),
        };

        let store = self.to_store()?;
        let profile = Profile::from_entry(&table, store.defaults())?;

        self.entries_mut()?.push(Value::Table(table));
        tracing::info!("Added profile {:?}", profile.name);
        Ok(profile)
    }

    /// Remove a profile by name
    pub fn remove(&mut self, name: &str) -> Result<(), SshtieError> {
        let index = self
            .position(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        self.entries_mut()?.remove(index);
        tracing::info!("Removed profile {:?}", name);
        Ok(())
    }

    /// Rename a profile, keeping every other field
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), SshtieError> {
        check_profile_name(to).map_err(|reason| ProfileError::invalid(to, "name", reason))?;
        let index = self
            .position(from)
            .ok_or_else(|| ProfileError::NotFound(from.to_string()))?;
        if self.contains(to) {
            return Err(ProfileError::AlreadyExists(to.to_string()).into());
        }
        if let Some(Value::Table(table)) = self.entries_mut()?.get_mut(index) {
            table.insert("name".to_string(), Value::String(to.to_string()));
        }
        tracing::info!("Renamed profile {:?} to {:?}", from, to);
        Ok(())
    }

    /// Duplicate a profile under a new name
    pub fn copy(&mut self, from: &str, to: &str) -> Result<(), SshtieError> {
        check_profile_name(to).map_err(|reason| ProfileError::invalid(to, "name", reason))?;
        let index = self
            .position(from)
            .ok_or_else(|| ProfileError::NotFound(from.to_string()))?;
        if self.contains(to) {
            return Err(ProfileError::AlreadyExists(to.to_string()).into());
        }
        let entries = self.entries_mut()?;
        let mut copy = entries[index].clone();
        if let Value::Table(table) = &mut copy {
            table.insert("name".to_string(), Value::String(to.to_string()));
        }
        entries.push(copy);
        tracing::info!("Copied profile {:?} to {:?}", from, to);
        Ok(())
    }

    /// One entry as a standalone TOML document, for editing
    pub fn entry_toml(&self, name: &str) -> Result<String, SshtieError> {
        let table = self
            .position(name)
            .and_then(|index| self.entries()?.get(index)?.as_table())
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        Ok(toml::to_string_pretty(table).map_err(ConfigError::from)?)
    }

    /// Swap in an edited entry after validating it
    ///
    /// The entry keeps `name`, whatever the edited text says. Nothing
    /// changes if parsing or validation fails.
    pub fn replace(&mut self, name: &str, content: &str) -> Result<Profile, SshtieError> {
        let index = self
            .position(name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        let mut table: Table = toml::from_str(content).map_err(ConfigError::from)?;
        table.insert("name".to_string(), Value::String(name.to_string()));

        let store = self.to_store()?;
        let profile = Profile::from_entry(&table, store.defaults())?;

        self.entries_mut()?[index] = Value::Table(table);
        tracing::info!("Updated profile {:?}", name);
        Ok(profile)
    }

    /// Write the document back with owner-only permissions
    pub fn save(&self) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(&self.document)?;
        write_private(&self.path, &content)
    }

    /// Read-only view of the current document
    pub fn to_store(&self) -> Result<ProfileStore, ConfigError> {
        ProfileStore::from_document(self.document.clone())
    }

    fn entries(&self) -> Option<&Vec<Value>> {
        self.document.get("profiles").and_then(Value::as_array)
    }

    fn entries_mut(&mut self) -> Result<&mut Vec<Value>, ConfigError> {
        self.document
            .entry("profiles")
            .or_insert(Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| {
                ConfigError::Invalid("`profiles` must be an array of tables ([[profiles]])".into())
            })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries()?
            .iter()
            .position(|v| v.as_table().and_then(entry_name) == Some(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransportKind;
    use std::time::Duration;
    use tempfile::TempDir;

    fn entry(name: &str, host: &str) -> ProfileEntry {
        ProfileEntry {
            name: name.to_string(),
            host: host.to_string(),
            transport_order: Some(vec![TransportKind::Mosh, TransportKind::Ssh]),
            connect_timeout: Some(Duration::from_secs(10)),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profiles.toml");

        let mut file = ProfileFile::load(&path).unwrap();
        let profile = file.add(entry("box1", "10.0.0.5")).unwrap();
        assert_eq!(profile.tmux_session, "box1");
        file.save().unwrap();

        let store = ProfileStore::load(&path).unwrap();
        let resolved = store.resolve("box1").unwrap();
        assert_eq!(resolved.host, "10.0.0.5");
        assert_eq!(resolved.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_add_duplicate_rejected() {
        let dir = TempDir::new().unwrap();
        let mut file = ProfileFile::load(&dir.path().join("p.toml")).unwrap();
        file.add(entry("box1", "h")).unwrap();
        let err = file.add(entry("box1", "other")).unwrap_err();
        assert!(matches!(
            err,
            SshtieError::Profile(ProfileError::AlreadyExists(ref n)) if n == "box1"
        ));
    }

    #[test]
    fn test_add_invalid_rejected() {
        let dir = TempDir::new().unwrap();
        let mut file = ProfileFile::load(&dir.path().join("p.toml")).unwrap();
        let mut bad = entry("box1", "h");
        bad.transport_order = Some(vec![]);
        assert!(matches!(
            file.add(bad),
            Err(SshtieError::Profile(ProfileError::Invalid { .. }))
        ));
        assert!(file.names().is_empty());
    }

    #[test]
    fn test_rename_copy_remove() {
        let dir = TempDir::new().unwrap();
        let mut file = ProfileFile::load(&dir.path().join("p.toml")).unwrap();
        file.add(entry("a", "h")).unwrap();

        file.rename("a", "b").unwrap();
        assert_eq!(file.names(), vec!["b"]);

        file.copy("b", "c").unwrap();
        assert_eq!(file.names(), vec!["b", "c"]);
        assert!(file.copy("b", "c").is_err());

        file.remove("b").unwrap();
        assert_eq!(file.names(), vec!["c"]);
        assert!(matches!(
            file.remove("b"),
            Err(SshtieError::Profile(ProfileError::NotFound(_)))
        ));
        assert!(file.rename("c", "has space").is_err());
    }

    #[test]
    fn test_edit_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut file = ProfileFile::load(&dir.path().join("p.toml")).unwrap();
        file.add(entry("box1", "10.0.0.5")).unwrap();

        let text = file.entry_toml("box1").unwrap();
        assert!(text.contains("host = \"10.0.0.5\""));

        let edited = text.replace("10.0.0.5", "10.0.0.9").replace("\"box1\"", "\"other\"");
        let profile = file.replace("box1", &edited).unwrap();
        assert_eq!(profile.name, "box1");
        assert_eq!(profile.host, "10.0.0.9");
        assert_eq!(file.names(), vec!["box1"]);
        assert_eq!(file.to_store().unwrap().resolve("box1").unwrap().host, "10.0.0.9");
    }

    #[test]
    fn test_invalid_edit_leaves_entry_alone() {
        let dir = TempDir::new().unwrap();
        let mut file = ProfileFile::load(&dir.path().join("p.toml")).unwrap();
        file.add(entry("box1", "10.0.0.5")).unwrap();

        let err = file
            .replace("box1", "host = \"10.0.0.9\"\ntransport_order = [\"mosh\", \"mosh\"]")
            .unwrap_err();
        assert!(matches!(
            err,
            SshtieError::Profile(ProfileError::Invalid { ref field, .. }) if field == "transport_order"
        ));
        assert!(matches!(
            file.replace("box1", "host = "),
            Err(SshtieError::Config(ConfigError::Parse(_)))
        ));
        assert!(matches!(
            file.entry_toml("nope"),
            Err(SshtieError::Profile(ProfileError::NotFound(_)))
        ));
        assert_eq!(file.to_store().unwrap().resolve("box1").unwrap().host, "10.0.0.5");
    }

    #[test]
    fn test_defaults_preserved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.toml");
        std::fs::write(
            &path,
            "[defaults]\ntransport_order = [\"ssh\"]\nconnect_timeout = 5\n",
        )
        .unwrap();

        let mut file = ProfileFile::load(&path).unwrap();
        file.add(ProfileEntry {
            name: "x".into(),
            host: "h".into(),
            ..Default::default()
        })
        .unwrap();
        file.save().unwrap();

        let store = ProfileStore::load(&path).unwrap();
        assert_eq!(store.resolve("x").unwrap().transport_order, vec![TransportKind::Ssh]);
    }
}
