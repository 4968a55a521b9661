//! Session lock records for active connections
//!
//! Every attached session writes a small JSON record named after its
//! profile and process id. Records of processes that are no longer alive
//! are stale and get pruned when listing.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::config::write_private;
use crate::types::TransportKind;

const RECORD_EXTENSION: &str = "json";

/// One active connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub profile: String,
    pub pid: u32,
    pub transport: TransportKind,
    pub session: String,
    /// Unix time in milliseconds
    pub started_at: u64,
}

impl SessionRecord {
    /// File name of this record inside the sessions directory
    pub fn file_name(&self) -> String {
        format!("{}-{}.{}", self.profile, self.pid, RECORD_EXTENSION)
    }
}

/// Write a record into `dir`, returning its path
pub fn write_record(dir: &Path, record: &SessionRecord) -> io::Result<PathBuf> {
    let path = dir.join(record.file_name());
    let content = serde_json::to_string_pretty(record).map_err(io::Error::from)?;
    write_private(&path, &content).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok(path)
}

/// Read a record
///
/// Returns `Ok(None)` if the file doesn't exist, or an error if it is malformed.
pub fn read_record(path: &Path) -> io::Result<Option<SessionRecord>> {
    match fs::File::open(path) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let record = serde_json::from_str(&contents)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(record))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove a record
///
/// Returns `Ok(())` even if the file doesn't exist.
pub fn remove_record(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Records of live processes, oldest first
///
/// Stale and unreadable records are deleted along the way.
pub fn list_active(dir: &Path) -> io::Result<Vec<SessionRecord>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut active = Vec::new();
    for entry in read_dir {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
            continue;
        }
        match read_record(&path) {
            Ok(Some(record)) if is_process_alive(record.pid) => active.push(record),
            Ok(Some(record)) => {
                tracing::debug!("Pruning stale session record for {} (pid {})", record.profile, record.pid);
                remove_record(&path)?;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Removing unreadable session record {:?}: {}", path, e);
                remove_record(&path)?;
            }
        }
    }

    active.sort_by_key(|r| r.started_at);
    Ok(active)
}

/// Check if a process with the given PID is still alive
///
/// On Unix, uses kill(pid, 0) to check if the process exists.
/// On Windows, uses OpenProcess to check if the process exists.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // EPERM means the process exists but belongs to someone else
    unsafe {
        if libc::kill(pid, 0) == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}

#[cfg(windows)]
pub fn is_process_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle == 0 || handle == INVALID_HANDLE_VALUE {
            return false;
        }
        CloseHandle(handle);
        true
    }
}

/// Guard that removes the session record when dropped
pub struct SessionLockGuard {
    path: PathBuf,
}

impl SessionLockGuard {
    /// Write the record and hold it until the guard is dropped
    pub fn acquire(dir: &Path, record: &SessionRecord) -> io::Result<Self> {
        let path = write_record(dir, record)?;
        tracing::debug!("Wrote session record {:?}", path);
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLockGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_record(&self.path) {
            tracing::warn!("Failed to remove session record {:?}: {}", self.path, e);
        }
    }
}
