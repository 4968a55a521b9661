//! Scripted transport backends and multiplexer for orchestrator tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use st_core::{
    Multiplexer, MultiplexerError, ProfileStore, RemoteCommand, RemoteOutput, TransportBackend,
    TransportCandidate, TransportError, TransportHandle, TransportKind,
};

/// What `establish` does on a fake handle
#[derive(Debug, Clone)]
pub enum Establish {
    Connect,
    Fail(TransportError),
    /// Never completes; only a timeout or cancellation ends it
    Hang,
}

/// Backend whose handles follow a script
pub struct FakeBackend {
    kind: TransportKind,
    establish: Establish,
    open_error: Option<TransportError>,
    opened: AtomicUsize,
    closed_flags: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakeBackend {
    pub fn new(kind: TransportKind, establish: Establish) -> Arc<Self> {
        Arc::new(Self {
            kind,
            establish,
            open_error: None,
            opened: AtomicUsize::new(0),
            closed_flags: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_open(kind: TransportKind, error: TransportError) -> Arc<Self> {
        Arc::new(Self {
            kind,
            establish: Establish::Connect,
            open_error: Some(error),
            opened: AtomicUsize::new(0),
            closed_flags: Mutex::new(Vec::new()),
        })
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Whether every handle this backend produced has been closed
    pub fn all_closed(&self) -> bool {
        self.closed_flags
            .lock()
            .unwrap()
            .iter()
            .all(|flag| flag.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl TransportBackend for FakeBackend {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(
        &self,
        _candidate: &TransportCandidate,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        if let Some(e) = &self.open_error {
            return Err(e.clone());
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let closed = Arc::new(AtomicBool::new(false));
        self.closed_flags.lock().unwrap().push(closed.clone());
        Ok(Box::new(FakeHandle {
            kind: self.kind,
            establish: self.establish.clone(),
            closed,
        }))
    }
}

pub struct FakeHandle {
    kind: TransportKind,
    establish: Establish,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl TransportHandle for FakeHandle {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn pid(&self) -> Option<u32> {
        None
    }

    async fn establish(&mut self) -> Result<(), TransportError> {
        match &self.establish {
            Establish::Connect => Ok(()),
            Establish::Fail(e) => Err(e.clone()),
            Establish::Hang => std::future::pending().await,
        }
    }

    async fn exec(&mut self, _command: &RemoteCommand) -> Result<RemoteOutput, TransportError> {
        Ok(RemoteOutput::default())
    }

    async fn interact(&mut self, _command: &RemoteCommand) -> Result<i32, TransportError> {
        Ok(0)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Multiplexer with a fixed set of existing sessions
#[derive(Default)]
pub struct FakeMultiplexer {
    existing: Vec<String>,
    unavailable: bool,
    hang: bool,
    failures: Vec<(TransportKind, MultiplexerError)>,
    sessions_dir: Option<PathBuf>,
    calls: Mutex<Vec<String>>,
    records_seen: Mutex<Vec<usize>>,
}

impl FakeMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, name: &str) -> Self {
        self.existing.push(name.to_string());
        self
    }

    /// Every call fails as if tmux were missing
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Attaching over `kind` fails with `error`; other transports behave normally
    pub fn failing_on(mut self, kind: TransportKind, error: MultiplexerError) -> Self {
        self.failures.push((kind, error));
        self
    }

    /// Attaching never returns
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    /// Count session records in `dir` whenever a session is attached
    pub fn watching_records(mut self, dir: PathBuf) -> Self {
        self.sessions_dir = Some(dir);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn records_seen(&self) -> Vec<usize> {
        self.records_seen.lock().unwrap().clone()
    }

    fn observe_records(&self) {
        if let Some(dir) = &self.sessions_dir {
            let count = std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0);
            self.records_seen.lock().unwrap().push(count);
        }
    }
}

#[async_trait]
impl Multiplexer for FakeMultiplexer {
    fn name(&self) -> &str {
        "fake-tmux"
    }

    async fn attach(
        &self,
        handle: &mut dyn TransportHandle,
        session: &str,
    ) -> Result<(), MultiplexerError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("attach {}", session));
        if let Some((_, error)) = self.failures.iter().find(|(kind, _)| *kind == handle.kind()) {
            return Err(error.clone());
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.unavailable {
            return Err(MultiplexerError::Unavailable(
                "tmux is not installed on the remote host".to_string(),
            ));
        }
        if !self.existing.iter().any(|s| s == session) {
            return Err(MultiplexerError::NoSuchSession(session.to_string()));
        }
        self.observe_records();
        Ok(())
    }

    async fn create_and_attach(
        &self,
        _handle: &mut dyn TransportHandle,
        session: &str,
    ) -> Result<(), MultiplexerError> {
        self.calls.lock().unwrap().push(format!("create {}", session));
        if self.unavailable {
            return Err(MultiplexerError::Unavailable(
                "tmux is not installed on the remote host".to_string(),
            ));
        }
        self.observe_records();
        Ok(())
    }
}

/// Store holding a single `box1` profile with the given transport order
pub fn store_with_order(order: &str, timeout_secs: u64) -> Arc<ProfileStore> {
    let src = format!(
        r#"
[[profiles]]
name = "box1"
host = "10.0.0.5"
user = "deploy"
transport_order = {}
tmux_session = "auto"
connect_timeout = {}
"#,
        order, timeout_secs
    );
    Arc::new(ProfileStore::from_toml_str(&src).unwrap())
}
