//! Remote tmux driver
//!
//! Commands are built as argument vectors and run over the transport handle;
//! the handle shell-escapes them for the remote shell.

use async_trait::async_trait;

use st_core::{MultiplexerError, RemoteCommand, RemoteOutput, TransportHandle};
use st_core::traits::Multiplexer;

/// Exit status of a shell that could not find the command
const COMMAND_NOT_FOUND: i32 = 127;

/// Builds tmux command lines without executing them
#[derive(Debug, Clone, Copy, Default)]
pub struct TmuxCommandBuilder;

impl TmuxCommandBuilder {
    pub fn new() -> Self {
        TmuxCommandBuilder
    }

    /// `tmux has-session -t =<name>`
    ///
    /// The `=` prefix makes tmux match the name exactly instead of as a prefix.
    pub fn has_session(&self, name: &str) -> RemoteCommand {
        RemoteCommand::new(["tmux", "has-session", "-t", exact(name).as_str()])
    }

    /// `tmux attach-session -t =<name>`
    pub fn attach_session(&self, name: &str) -> RemoteCommand {
        RemoteCommand::new(["tmux", "attach-session", "-t", exact(name).as_str()])
    }

    /// `tmux new-session -A -s <name>`
    pub fn new_session(&self, name: &str) -> RemoteCommand {
        RemoteCommand::new(["tmux", "new-session", "-A", "-s", name])
    }
}

fn exact(name: &str) -> String {
    format!("={}", name)
}

/// tmux on the far side of a transport
#[derive(Debug, Clone, Default)]
pub struct TmuxMultiplexer {
    commands: TmuxCommandBuilder,
}

impl TmuxMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Multiplexer for TmuxMultiplexer {
    fn name(&self) -> &str {
        "tmux"
    }

    async fn attach(
        &self,
        handle: &mut dyn TransportHandle,
        session: &str,
    ) -> Result<(), MultiplexerError> {
        let probe = handle.exec(&self.commands.has_session(session)).await?;
        if !probe.success() {
            return Err(classify_has_session(&probe, session));
        }

        tracing::info!("Attaching to tmux session {:?}", session);
        let status = handle
            .interact(&self.commands.attach_session(session))
            .await?;
        check_interactive_status("attach-session", status)
    }

    async fn create_and_attach(
        &self,
        handle: &mut dyn TransportHandle,
        session: &str,
    ) -> Result<(), MultiplexerError> {
        tracing::info!("Creating tmux session {:?}", session);
        let status = handle.interact(&self.commands.new_session(session)).await?;
        check_interactive_status("new-session", status)
    }
}

/// Interpret a failed `tmux has-session`
fn classify_has_session(output: &RemoteOutput, session: &str) -> MultiplexerError {
    let stderr = output.stderr.trim();
    let lower = stderr.to_ascii_lowercase();

    if output.status == COMMAND_NOT_FOUND
        || lower.contains("command not found")
        || lower.contains("tmux: not found")
    {
        MultiplexerError::Unavailable("tmux is not installed on the remote host".to_string())
    } else if lower.contains("can't find session")
        || lower.contains("no server running")
        || lower.contains("error connecting to")
        || (output.status == 1 && stderr.is_empty())
    {
        MultiplexerError::NoSuchSession(session.to_string())
    } else {
        MultiplexerError::Unavailable(format!(
            "tmux has-session exited with status {}: {}",
            output.status, stderr
        ))
    }
}

fn check_interactive_status(step: &str, status: i32) -> Result<(), MultiplexerError> {
    match status {
        0 => Ok(()),
        COMMAND_NOT_FOUND => Err(MultiplexerError::Unavailable(
            "tmux is not installed on the remote host".to_string(),
        )),
        status => Err(MultiplexerError::Unavailable(format!(
            "tmux {} exited with status {}",
            step, status
        ))),
    }
}
