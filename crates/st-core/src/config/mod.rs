//! Configuration management for sshtie

mod file;
mod profile;
pub mod serde_utils;
mod store;

pub use file::ProfileFile;
pub use profile::{
    check_profile_name, derive_session_name, expand_home, AutoSessionNaming, ExtraArgs,
    NetworkMode, Profile, ProfileDefaults, ProfileEntry, SshOptions, AUTO_SESSION,
    DEFAULT_CONNECTION_ATTEMPTS, DEFAULT_PORT, DEFAULT_SERVER_ALIVE_COUNT_MAX,
    DEFAULT_SERVER_ALIVE_INTERVAL,
};
pub use store::ProfileStore;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "SSHTIE_CONFIG_DIR";

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sshtie")
}

/// Get the default profile file path
pub fn default_profiles_path() -> PathBuf {
    default_config_dir().join("profiles.toml")
}

/// Directory holding one record per live session
pub fn default_sessions_dir() -> PathBuf {
    default_config_dir().join("sessions")
}

/// Write a file readable only by the current user
///
/// Creates parent directories if they don't exist.
pub fn write_private(path: &Path, content: &str) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, content).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }

    Ok(())
}
