//! Core trait definitions

mod multiplexer;
mod transport;

pub use multiplexer::Multiplexer;
pub use transport::{
    shell_escape, RemoteCommand, RemoteOutput, TransportBackend, TransportCandidate,
    TransportHandle,
};
