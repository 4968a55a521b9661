//! Remote terminal multiplexer trait

use async_trait::async_trait;

use super::transport::TransportHandle;
use crate::error::MultiplexerError;

/// Attaches the user's terminal to a persistent remote session
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Name of the multiplexer, for diagnostics
    fn name(&self) -> &str;

    /// Attach to an existing session
    ///
    /// Fails with [`MultiplexerError::NoSuchSession`] if `session` does not
    /// exist on the remote side.
    async fn attach(
        &self,
        handle: &mut dyn TransportHandle,
        session: &str,
    ) -> Result<(), MultiplexerError>;

    /// Create `session` and attach to it
    async fn create_and_attach(
        &self,
        handle: &mut dyn TransportHandle,
        session: &str,
    ) -> Result<(), MultiplexerError>;
}
