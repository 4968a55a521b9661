//! Plain OpenSSH transport

use async_trait::async_trait;

use st_core::{
    RemoteCommand, RemoteOutput, TransportBackend, TransportCandidate, TransportError,
    TransportHandle, TransportKind,
};

use super::control::SshSession;

/// Opens OpenSSH connections
#[derive(Debug, Clone, Copy, Default)]
pub struct SshBackend;

impl SshBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportBackend for SshBackend {
    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }

    async fn open(
        &self,
        candidate: &TransportCandidate,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        Ok(Box::new(SshHandle {
            session: SshSession::new(candidate, &candidate.extra_args),
        }))
    }
}

/// A single OpenSSH connection attempt
pub struct SshHandle {
    session: SshSession,
}

#[async_trait]
impl TransportHandle for SshHandle {
    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }

    fn pid(&self) -> Option<u32> {
        self.session.pid()
    }

    async fn establish(&mut self) -> Result<(), TransportError> {
        self.session.establish().await
    }

    async fn exec(&mut self, command: &RemoteCommand) -> Result<RemoteOutput, TransportError> {
        self.session.exec(command).await
    }

    async fn interact(&mut self, command: &RemoteCommand) -> Result<i32, TransportError> {
        self.session.interact(command).await
    }

    async fn close(&mut self) {
        self.session.close().await
    }

    fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}
