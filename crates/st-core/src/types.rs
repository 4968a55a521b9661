//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A way of reaching the remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// mosh, bootstrapped over ssh, roaming over UDP
    Mosh,
    /// Plain OpenSSH
    Ssh,
}

impl TransportKind {
    /// All supported transports
    pub const ALL: [TransportKind; 2] = [TransportKind::Mosh, TransportKind::Ssh];

    /// Token used in profile files
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Mosh => "mosh",
            TransportKind::Ssh => "ssh",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mosh" => Ok(TransportKind::Mosh),
            "ssh" => Ok(TransportKind::Ssh),
            other => Err(format!("unknown transport {:?} (expected mosh or ssh)", other)),
        }
    }
}

/// Fully-qualified connection target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub user: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(user: Option<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            user,
            host: host.into(),
            port,
        }
    }

    /// Destination argument for ssh (`user@host` or `host`)
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Classification of a failed connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Timeout,
    Refused,
    AuthFailed,
    HostKeyRejected,
    MultiplexerUnavailable,
    Other,
}

impl FailureKind {
    pub const ALL: [FailureKind; 6] = [
        FailureKind::Timeout,
        FailureKind::Refused,
        FailureKind::AuthFailed,
        FailureKind::HostKeyRejected,
        FailureKind::MultiplexerUnavailable,
        FailureKind::Other,
    ];
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Refused => "refused",
            FailureKind::AuthFailed => "auth-failed",
            FailureKind::HostKeyRejected => "host-key-rejected",
            FailureKind::MultiplexerUnavailable => "multiplexer-unavailable",
            FailureKind::Other => "error",
        };
        f.write_str(s)
    }
}
