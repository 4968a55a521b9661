//! Transport backends
//!
//! The registry maps each transport kind to the backend that opens it. The
//! process-backed `ssh` and `mosh` backends drive the local OpenSSH client;
//! tests register fakes instead.

mod classify;
mod control;
mod mosh;
mod ssh;

use std::collections::HashMap;
use std::sync::Arc;

use st_core::{TransportBackend, TransportKind};

pub use classify::classify_ssh_stderr;
pub use mosh::{parse_mosh_connect, MoshBackend, MoshHandle, MOSH_DEFAULT_PORT};
pub use ssh::{SshBackend, SshHandle};

/// Backends by transport kind
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<TransportKind, Arc<dyn TransportBackend>>,
}

impl BackendRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the process-backed `ssh` and `mosh` backends
    pub fn system() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SshBackend::new()));
        registry.register(Arc::new(MoshBackend::new()));
        registry
    }

    /// Register a backend, replacing any previous one of the same kind
    pub fn register(&mut self, backend: Arc<dyn TransportBackend>) {
        self.backends.insert(backend.kind(), backend);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, backend: Arc<dyn TransportBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, kind: TransportKind) -> Option<Arc<dyn TransportBackend>> {
        self.backends.get(&kind).cloned()
    }

    pub fn contains(&self, kind: TransportKind) -> bool {
        self.backends.contains_key(&kind)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.backends.keys().collect();
        kinds.sort();
        f.debug_struct("BackendRegistry").field("backends", &kinds).finish()
    }
}
