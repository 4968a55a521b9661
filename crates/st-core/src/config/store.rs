//! Read-only profile store

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use toml::{Table, Value};

use super::profile::{Profile, ProfileDefaults};
use crate::error::{ConfigError, ProfileError};

/// Loaded profile definitions
///
/// The store is immutable after loading. Entries are kept in their raw form
/// and validated each time they are resolved, so one broken entry never
/// hides the others.
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    source: Option<PathBuf>,
    defaults: ProfileDefaults,
    entries: Vec<Table>,
}

impl ProfileStore {
    /// Load profiles from a file. A missing file gives an empty store.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = {
            let mut file = match std::fs::File::open(path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!("Profile file {:?} does not exist, using empty store", path);
                    return Ok(Self {
                        source: Some(path.to_path_buf()),
                        ..Self::default()
                    });
                }
                Err(source) => {
                    return Err(ConfigError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            };
            let mut content = String::new();
            file.read_to_string(&mut content)
                .map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            content
        };

        let mut store = Self::from_toml_str(&content)?;
        store.source = Some(path.to_path_buf());
        tracing::debug!("Loaded {} profile entries from {:?}", store.len(), path);
        Ok(store)
    }

    /// Parse a profile document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let document: Table = toml::from_str(content)?;
        Self::from_document(document)
    }

    pub(crate) fn from_document(mut document: Table) -> Result<Self, ConfigError> {
        let defaults = match document.remove("defaults") {
            Some(value) => {
                let defaults: ProfileDefaults = value
                    .try_into()
                    .map_err(|e| ConfigError::Invalid(format!("[defaults]: {}", e)))?;
                defaults
                    .validate()
                    .map_err(|reason| ConfigError::Invalid(format!("[defaults]: {}", reason)))?;
                defaults
            }
            None => ProfileDefaults::default(),
        };

        let entries = match document.remove("profiles") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Table(table) => Ok(table),
                    _ => Err(ConfigError::Invalid(format!(
                        "profiles[{}] must be a table",
                        i
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ConfigError::Invalid(
                    "`profiles` must be an array of tables ([[profiles]])".to_string(),
                ))
            }
        };

        if let Some(key) = document.keys().next() {
            return Err(ConfigError::Invalid(format!(
                "unknown top-level key `{}`",
                key
            )));
        }

        Ok(Self {
            source: None,
            defaults,
            entries,
        })
    }

    /// Resolve a profile by name
    pub fn resolve(&self, name: &str) -> Result<Profile, ProfileError> {
        let mut matches = self.entries.iter().filter(|e| entry_name(e) == Some(name));
        let entry = matches
            .next()
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        if matches.next().is_some() {
            return Err(ProfileError::invalid(
                name,
                "name",
                "is defined more than once",
            ));
        }
        Profile::from_entry(entry, &self.defaults)
    }

    /// Every entry in file order with its own validation result
    pub fn list(&self) -> Vec<(String, Result<Profile, ProfileError>)> {
        self.entries
            .iter()
            .map(|entry| {
                let name = entry_name(entry).unwrap_or("<unnamed>").to_string();
                let result = match entry_name(entry) {
                    Some(n) => self.resolve(n),
                    None => Profile::from_entry(entry, &self.defaults),
                };
                (name, result)
            })
            .collect()
    }

    /// Names of all entries in file order
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(entry_name)
            .map(str::to_string)
            .collect()
    }

    pub fn defaults(&self) -> &ProfileDefaults {
        &self.defaults
    }

    /// Path the store was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn entry_name(entry: &Table) -> Option<&str> {
    entry.get("name").and_then(Value::as_str)
}
