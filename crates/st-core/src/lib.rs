//! st-core: Core abstractions and configuration for sshtie
//!
//! This crate provides the profile store, shared types, the transport and
//! multiplexer traits, and the on-disk formats used by the orchestrator and
//! the CLI.

pub mod config;
pub mod error;
pub mod session_lock;
pub mod ssh_config;
pub mod tailscale;
pub mod traits;
pub mod types;

pub use config::{Profile, ProfileFile, ProfileStore};
pub use error::{ConfigError, MultiplexerError, ProfileError, SshtieError, TransportError};
pub use traits::{
    Multiplexer, RemoteCommand, RemoteOutput, TransportBackend, TransportCandidate,
    TransportHandle,
};
pub use types::{FailureKind, Target, TransportKind};
