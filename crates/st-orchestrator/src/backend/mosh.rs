//! mosh transport, bootstrapped over OpenSSH

use async_trait::async_trait;
use std::net::SocketAddr;
use std::process::Stdio;
use std::time::Duration;

use st_core::{
    RemoteCommand, RemoteOutput, TransportBackend, TransportCandidate, TransportError,
    TransportHandle, TransportKind,
};

use super::control::SshSession;

/// First port `mosh-server` binds by default
pub const MOSH_DEFAULT_PORT: u16 = 60001;

/// Upper bound for the UDP reachability probe
const UDP_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens mosh sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct MoshBackend;

impl MoshBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportBackend for MoshBackend {
    fn kind(&self) -> TransportKind {
        TransportKind::Mosh
    }

    async fn open(
        &self,
        candidate: &TransportCandidate,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        if cfg!(windows) {
            return Err(TransportError::Other(
                "mosh is not supported on Windows".to_string(),
            ));
        }
        Ok(Box::new(MoshHandle {
            session: SshSession::new(candidate, &[]),
            server: candidate
                .mosh_server
                .clone()
                .unwrap_or_else(|| "mosh-server".to_string()),
            server_args: candidate.extra_args.clone(),
            remote_addr: None,
        }))
    }
}

/// A mosh session attempt
///
/// `establish` brings up the ssh bootstrap connection and checks that the
/// remote side can run `mosh-server`.
pub struct MoshHandle {
    session: SshSession,
    server: String,
    server_args: Vec<String>,
    remote_addr: Option<SocketAddr>,
}

impl MoshHandle {
    async fn check_server(&mut self) -> Result<(), TransportError> {
        let probe = if self.server.contains('/') {
            RemoteCommand::new(["test", "-x", self.server.as_str()])
        } else {
            RemoteCommand::new(["command", "-v", self.server.as_str()])
        };
        let output = self.session.exec(&probe).await?;
        if output.success() {
            Ok(())
        } else {
            Err(TransportError::Other(format!(
                "{} not found on the remote host",
                self.server
            )))
        }
    }

    /// Resolve the address `mosh-client` will talk to and look at its UDP port
    ///
    /// `mosh-server` is not running yet, so the probe only feeds the log; a
    /// closed port here says nothing about the port the server will bind.
    async fn resolve_remote(&mut self) -> Result<(), TransportError> {
        let host = self.session.host().trim_start_matches('[').trim_end_matches(']');
        let addr = tokio::net::lookup_host((host, MOSH_DEFAULT_PORT))
            .await
            .map_err(|e| TransportError::Other(format!("cannot resolve {}: {}", host, e)))?
            .next()
            .ok_or_else(|| TransportError::Other(format!("{} has no addresses", host)))?;
        self.remote_addr = Some(addr);

        let wait = UDP_PROBE_TIMEOUT.min(self.session.timeout());
        match probe_udp(addr, wait).await {
            UdpProbe::Closed => tracing::debug!(
                "UDP {} answered port unreachable; mosh-server not started yet",
                addr
            ),
            UdpProbe::Silent => tracing::debug!("UDP {} sent no reply", addr),
        }
        Ok(())
    }

    fn server_command(&self, command: &RemoteCommand) -> RemoteCommand {
        let mut argv = vec![
            self.server.clone(),
            "new".to_string(),
            "-s".to_string(),
            "-c".to_string(),
            "256".to_string(),
        ];
        for var in ["LANG", "LC_ALL", "LC_CTYPE"] {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    argv.push("-l".to_string());
                    argv.push(format!("{}={}", var, value));
                }
            }
        }
        argv.extend(self.server_args.iter().cloned());
        argv.push("--".to_string());
        argv.extend(command.argv.iter().cloned());
        RemoteCommand { argv }
    }
}

#[async_trait]
impl TransportHandle for MoshHandle {
    fn kind(&self) -> TransportKind {
        TransportKind::Mosh
    }

    fn pid(&self) -> Option<u32> {
        self.session.pid()
    }

    async fn establish(&mut self) -> Result<(), TransportError> {
        self.session.establish().await?;
        self.check_server().await?;
        self.resolve_remote().await
    }

    async fn exec(&mut self, command: &RemoteCommand) -> Result<RemoteOutput, TransportError> {
        self.session.exec(command).await
    }

    /// Start `mosh-server` running `command` and hand the terminal to `mosh-client`
    async fn interact(&mut self, command: &RemoteCommand) -> Result<i32, TransportError> {
        let output = self.session.exec(&self.server_command(command)).await?;
        let (port, key) = parse_mosh_connect(&output.stdout).ok_or_else(|| {
            let detail = output.stderr.trim();
            TransportError::Other(if detail.is_empty() {
                "mosh-server did not report a port and key".to_string()
            } else {
                format!("mosh-server failed: {}", detail)
            })
        })?;
        let ip = match self.remote_addr {
            Some(addr) => addr.ip(),
            None => return Err(TransportError::Other("remote address unknown".to_string())),
        };

        tracing::debug!("Starting mosh-client for {} port {}", ip, port);
        let status = tokio::process::Command::new("mosh-client")
            .arg(ip.to_string())
            .arg(port.to_string())
            .env("MOSH_KEY", key)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TransportError::Other("mosh-client not found in PATH".to_string())
                } else {
                    TransportError::Other(format!("failed to start mosh-client: {}", e))
                }
            })?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn close(&mut self) {
        self.session.close().await
    }

    fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}

/// Extract port and key from `MOSH CONNECT <port> <key>`
pub fn parse_mosh_connect(stdout: &str) -> Option<(u16, String)> {
    stdout.lines().find_map(|line| {
        let mut parts = line.trim().split_whitespace();
        if parts.next()? != "MOSH" || parts.next()? != "CONNECT" {
            return None;
        }
        let port = parts.next()?.parse().ok()?;
        let key = parts.next()?.to_string();
        Some((port, key))
    })
}

/// What an empty datagram to a UDP port came back with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UdpProbe {
    /// ICMP port unreachable: the host answered, nothing listens there
    Closed,
    /// No reply within the wait, or the probe could not be sent
    Silent,
}

async fn probe_udp(addr: SocketAddr, wait: Duration) -> UdpProbe {
    let bind: SocketAddr = if addr.is_ipv4() {
        ([0u8; 4], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let socket = match tokio::net::UdpSocket::bind(bind).await {
        Ok(socket) => socket,
        Err(_) => return UdpProbe::Silent,
    };
    if socket.connect(addr).await.is_err() || socket.send(&[]).await.is_err() {
        return UdpProbe::Silent;
    }
    let mut buf = [0u8; 1];
    match tokio::time::timeout(wait, socket.recv(&mut buf)).await {
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => UdpProbe::Closed,
        _ => UdpProbe::Silent,
    }
}
