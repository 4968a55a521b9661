//! Transport traits

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Profile, SshOptions};
use crate::error::TransportError;
use crate::types::{Target, TransportKind};

/// One planned way of reaching a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportCandidate {
    pub transport: TransportKind,
    pub target: Target,
    /// Full time allowed for this candidate to connect
    #[serde(with = "crate::config::serde_utils::duration_secs")]
    pub timeout: Duration,
    pub extra_args: Vec<String>,
    pub identity: Option<PathBuf>,
    pub ssh_options: SshOptions,
    pub mosh_server: Option<String>,
}

impl TransportCandidate {
    /// Candidate for `transport` with everything else taken from the profile
    pub fn from_profile(profile: &Profile, transport: TransportKind) -> Self {
        Self {
            transport,
            target: profile.target(),
            timeout: profile.connect_timeout,
            extra_args: profile.extra_args.for_transport(transport).to_vec(),
            identity: profile.key.clone(),
            ssh_options: profile.ssh_options.clone(),
            mosh_server: profile.mosh_server.clone(),
        }
    }
}

/// A command to run on the remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub argv: Vec<String>,
}

impl RemoteCommand {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    /// Render as a single shell-escaped command line
    pub fn to_shell(&self) -> String {
        self.argv
            .iter()
            .map(|arg| shell_escape(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output of a captured remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    /// Exit status, `-1` if the command was killed by a signal
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Escape a string for use in a POSIX shell command line
pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '%' | ':' | '=' | '@' | ','))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Opens transport handles of one kind
#[async_trait]
pub trait TransportBackend: Send + Sync {
    /// Transport this backend implements
    fn kind(&self) -> TransportKind;

    /// Prepare a handle for the candidate. Nothing is connected yet.
    async fn open(
        &self,
        candidate: &TransportCandidate,
    ) -> Result<Box<dyn TransportHandle>, TransportError>;
}

/// A single connection attempt to a remote host
///
/// `close` must be safe to call more than once and on a handle that never
/// finished `establish`.
#[async_trait]
pub trait TransportHandle: Send {
    fn kind(&self) -> TransportKind;

    /// Local process id backing the connection, if any
    fn pid(&self) -> Option<u32>;

    /// Bring the connection up
    async fn establish(&mut self) -> Result<(), TransportError>;

    /// Run a command remotely and capture its output
    async fn exec(&mut self, command: &RemoteCommand) -> Result<RemoteOutput, TransportError>;

    /// Run a command remotely on the user's terminal, returning its exit status
    async fn interact(&mut self, command: &RemoteCommand) -> Result<i32, TransportError>;

    /// Tear the connection down
    async fn close(&mut self);

    fn is_closed(&self) -> bool;
}
