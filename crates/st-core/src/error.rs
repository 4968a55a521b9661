//! Core error types for sshtie

use std::path::PathBuf;
use thiserror::Error;

use crate::types::FailureKind;

/// Top-level error type for the sshtie crates
#[derive(Error, Debug)]
pub enum SshtieError {
    /// Profile resolution error
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Multiplexer error
    #[error("Multiplexer error: {0}")]
    Multiplexer(#[from] MultiplexerError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Profile resolution errors
///
/// These are local to the profile store and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// No profile with this name
    #[error("profile {0:?} not found")]
    NotFound(String),

    /// Stored profile data violates an invariant
    #[error("profile {profile:?} is invalid: field `{field}` {reason}")]
    Invalid {
        profile: String,
        field: String,
        reason: String,
    },

    /// A profile with this name already exists
    #[error("profile {0:?} already exists")]
    AlreadyExists(String),
}

impl ProfileError {
    pub(crate) fn invalid(
        profile: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            profile: profile.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Reading or writing the file failed
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures reported by a transport backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No connection within the allowed time
    #[error("timed out: {0}")]
    Timeout(String),

    /// The remote end actively refused the connection
    #[error("connection refused: {0}")]
    Refused(String),

    /// The remote host rejected our credentials
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The remote host key did not match
    #[error("host key verification failed: {0}")]
    HostKeyRejected(String),

    /// Anything else (missing binary, DNS failure, unexpected exit)
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Classification used by the failure policy
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::Timeout(_) => FailureKind::Timeout,
            TransportError::Refused(_) => FailureKind::Refused,
            TransportError::AuthFailed(_) => FailureKind::AuthFailed,
            TransportError::HostKeyRejected(_) => FailureKind::HostKeyRejected,
            TransportError::Other(_) => FailureKind::Other,
        }
    }
}

/// Failures of the remote multiplexer step
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultiplexerError {
    /// The requested session does not exist on the remote side
    #[error("no session named {0:?}")]
    NoSuchSession(String),

    /// The remote multiplexer could not be used
    #[error("multiplexer unavailable: {0}")]
    Unavailable(String),

    /// The transport failed underneath the multiplexer
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl MultiplexerError {
    /// Classification used by the failure policy
    pub fn kind(&self) -> FailureKind {
        match self {
            MultiplexerError::NoSuchSession(_) | MultiplexerError::Unavailable(_) => {
                FailureKind::MultiplexerUnavailable
            }
            MultiplexerError::Transport(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_names_field() {
        let err = ProfileError::invalid("box1", "transport_order", "must not be empty");
        let msg = err.to_string();
        assert!(msg.contains("box1"));
        assert!(msg.contains("`transport_order`"));
    }

    #[test]
    fn test_multiplexer_error_kind() {
        assert_eq!(
            MultiplexerError::Unavailable("tmux: command not found".into()).kind(),
            FailureKind::MultiplexerUnavailable
        );
        assert_eq!(
            MultiplexerError::Transport(TransportError::Refused("x".into())).kind(),
            FailureKind::Refused
        );
    }
}
