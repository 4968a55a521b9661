//! OpenSSH connection shared by the ssh and mosh backends
//!
//! On unix the connection is an OpenSSH control master: `establish` starts
//! `ssh -M -N` on a private socket and every later command rides on it, so
//! the user authenticates once per attempt. Windows builds of OpenSSH have
//! no connection sharing; there `establish` only checks that the port
//! answers and each command opens its own connection.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use st_core::config::{
    DEFAULT_CONNECTION_ATTEMPTS, DEFAULT_SERVER_ALIVE_COUNT_MAX, DEFAULT_SERVER_ALIVE_INTERVAL,
};
use st_core::{RemoteCommand, RemoteOutput, TransportCandidate, TransportError};

use super::classify::classify_ssh_stderr;

/// How often `establish` asks the master whether it is ready
#[cfg(unix)]
const CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Grace period for `-O exit` during close
#[cfg(unix)]
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Exit status OpenSSH uses for its own errors
const SSH_ERROR_STATUS: i32 = 255;

/// Options shared by every ssh invocation for a candidate
pub(crate) fn base_args(candidate: &TransportCandidate) -> Vec<String> {
    let options = &candidate.ssh_options;
    let connect_timeout = candidate.timeout.as_secs_f64().ceil().max(1.0) as u64;

    let mut args = vec![
        "-p".to_string(),
        candidate.target.port.to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", connect_timeout),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-o".to_string(),
        format!(
            "ServerAliveInterval={}",
            options
                .server_alive_interval
                .unwrap_or(DEFAULT_SERVER_ALIVE_INTERVAL)
        ),
        "-o".to_string(),
        format!(
            "ServerAliveCountMax={}",
            options
                .server_alive_count_max
                .unwrap_or(DEFAULT_SERVER_ALIVE_COUNT_MAX)
        ),
        "-o".to_string(),
        "TCPKeepAlive=yes".to_string(),
        "-o".to_string(),
        format!(
            "ConnectionAttempts={}",
            options
                .connection_attempts
                .unwrap_or(DEFAULT_CONNECTION_ATTEMPTS)
        ),
    ];
    if options.forward_agent {
        args.push("-o".to_string());
        args.push("ForwardAgent=yes".to_string());
    }
    if let Some(key) = &candidate.identity {
        args.push("-i".to_string());
        args.push(key.display().to_string());
    }
    args
}

/// One ssh connection to a candidate's target
pub(crate) struct SshSession {
    destination: String,
    port: u16,
    args: Vec<String>,
    timeout: Duration,
    #[cfg(unix)]
    socket_dir: Option<PathBuf>,
    master: Option<Child>,
    stderr_task: Option<JoinHandle<usize>>,
    closed: bool,
}

impl SshSession {
    /// Prepare a session; `extra_args` are appended to every ssh invocation
    pub fn new(candidate: &TransportCandidate, extra_args: &[String]) -> Self {
        let mut args = base_args(candidate);
        args.extend(extra_args.iter().cloned());
        Self {
            destination: candidate.target.destination(),
            port: candidate.target.port,
            args,
            timeout: candidate.timeout,
            #[cfg(unix)]
            socket_dir: None,
            master: None,
            stderr_task: None,
            closed: false,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.master.as_ref().and_then(Child::id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Host part of the destination
    pub fn host(&self) -> &str {
        self.destination
            .rsplit_once('@')
            .map(|(_, host)| host)
            .unwrap_or(&self.destination)
    }

    /// Start the control master and wait until it accepts sessions
    #[cfg(unix)]
    pub async fn establish(&mut self) -> Result<(), TransportError> {
        use tokio::io::AsyncReadExt;

        if self.closed {
            return Err(TransportError::Other("connection already closed".to_string()));
        }

        let socket_dir = create_socket_dir()
            .map_err(|e| TransportError::Other(format!("cannot create control socket directory: {}", e)))?;
        let socket = socket_dir.join("cm");
        self.socket_dir = Some(socket_dir);

        tracing::debug!("Starting ssh control master for {} port {}", self.destination, self.port);
        let mut child = Command::new("ssh")
            .arg("-M")
            .arg("-S")
            .arg(&socket)
            .args(["-o", "ControlPersist=no", "-N"])
            .args(&self.args)
            .arg(&self.destination)
            .stdin(Stdio::inherit())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;
        let mut stderr = child.stderr.take();
        self.master = Some(child);

        loop {
            let exited = match self.master.as_mut() {
                Some(master) => master
                    .try_wait()
                    .map_err(|e| TransportError::Other(format!("ssh control master: {}", e)))?,
                None => return Err(TransportError::Other("control master went away".to_string())),
            };

            if let Some(status) = exited {
                let mut diagnostic = String::new();
                if let Some(stderr) = stderr.as_mut() {
                    let _ = stderr.read_to_string(&mut diagnostic).await;
                }
                tracing::debug!("ssh control master exited with {}: {}", status, diagnostic.trim());
                return Err(classify_ssh_stderr(&diagnostic));
            }

            if self.control_check().await {
                tracing::debug!("ssh control master ready for {}", self.destination);
                if let Some(stderr) = stderr.take() {
                    let destination = self.destination.clone();
                    self.stderr_task = Some(tokio::spawn(log_stderr_lines(stderr, destination)));
                }
                return Ok(());
            }
            tokio::time::sleep(CHECK_INTERVAL).await;
        }
    }

    /// Check that the port answers; commands connect on their own
    #[cfg(not(unix))]
    pub async fn establish(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Other("connection already closed".to_string()));
        }
        let port = self.port;
        match tokio::net::TcpStream::connect((self.host(), port)).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                Err(TransportError::Refused(format!("{}:{}: {}", self.host(), port, e)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                Err(TransportError::Timeout(format!("{}:{}: {}", self.host(), port, e)))
            }
            Err(e) => Err(TransportError::Other(format!("{}:{}: {}", self.host(), port, e))),
        }
    }

    /// Run a command and capture its output
    pub async fn exec(&mut self, command: &RemoteCommand) -> Result<RemoteOutput, TransportError> {
        let mut cmd = self.command()?;
        cmd.arg("-T")
            .arg(&self.destination)
            .arg(command.to_shell())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!("Running remote command: {}", command.to_shell());
        let output = cmd.output().await.map_err(spawn_error)?;
        let status = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if status == SSH_ERROR_STATUS {
            return Err(classify_ssh_stderr(&stderr));
        }
        Ok(RemoteOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }

    /// Run a command on the user's terminal
    pub async fn interact(&mut self, command: &RemoteCommand) -> Result<i32, TransportError> {
        let mut cmd = self.command()?;
        cmd.arg("-t")
            .arg(&self.destination)
            .arg(command.to_shell())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        tracing::debug!("Starting interactive session: {}", command.to_shell());
        let status = cmd.status().await.map_err(spawn_error)?;
        match status.code() {
            Some(SSH_ERROR_STATUS) => Err(TransportError::Other(format!(
                "ssh session to {} ended with an ssh error",
                self.destination
            ))),
            Some(code) => Ok(code),
            None => Ok(-1),
        }
    }

    /// Stop the master and remove the socket directory
    ///
    /// Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        #[cfg(unix)]
        {
            if let Some(socket_dir) = self.socket_dir.take() {
                self.shutdown_master(socket_dir).await;
            }
        }

        if let Some(mut master) = self.master.take() {
            if let Err(e) = master.start_kill() {
                tracing::debug!("ssh control master already gone: {}", e);
            }
            let _ = master.wait().await;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        tracing::debug!("Closed ssh connection to {}", self.destination);
    }

    /// Whether the master answers `-O check`
    #[cfg(unix)]
    async fn control_check(&self) -> bool {
        let Some(socket_dir) = &self.socket_dir else {
            return false;
        };
        Command::new("ssh")
            .arg("-S")
            .arg(socket_dir.join("cm"))
            .args(["-O", "check"])
            .arg(&self.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[cfg(unix)]
    async fn shutdown_master(&mut self, socket_dir: PathBuf) {
        if self.master.is_some() {
            let exit = Command::new("ssh")
                .arg("-S")
                .arg(socket_dir.join("cm"))
                .args(["-O", "exit"])
                .arg(&self.destination)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status();
            if tokio::time::timeout(EXIT_GRACE, exit).await.is_err() {
                tracing::debug!("ssh -O exit did not finish in time");
            }
        }
        if let Err(e) = std::fs::remove_dir_all(&socket_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove control socket directory {:?}: {}", socket_dir, e);
            }
        }
    }

    /// ssh command routed over the master
    #[cfg(unix)]
    fn command(&self) -> Result<Command, TransportError> {
        let socket_dir = match (&self.socket_dir, self.closed) {
            (Some(dir), false) => dir,
            _ => return Err(TransportError::Other("connection is not established".to_string())),
        };
        let mut cmd = Command::new("ssh");
        cmd.arg("-S")
            .arg(socket_dir.join("cm"))
            .args(["-o", "ControlMaster=no"])
            .args(&self.args);
        Ok(cmd)
    }

    #[cfg(not(unix))]
    fn command(&self) -> Result<Command, TransportError> {
        if self.closed {
            return Err(TransportError::Other("connection is closed".to_string()));
        }
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "ControlMaster=no"]).args(&self.args);
        Ok(cmd)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        // kill_on_drop stops the master; only the directory is left to us
        #[cfg(unix)]
        {
            if let Some(dir) = self.socket_dir.take() {
                let _ = std::fs::remove_dir_all(dir);
            }
        }
    }
}

/// Forward the master's stderr to the log until it closes; returns the line count
#[cfg_attr(not(unix), allow(dead_code))]
async fn log_stderr_lines<R: AsyncRead + Unpin>(stderr: R, destination: String) -> usize {
    let mut lines = BufReader::new(stderr).lines();
    let mut count = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                count += 1;
                tracing::debug!("ssh master ({}): {}", destination, line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("ssh master ({}) stderr closed: {}", destination, e);
                break;
            }
        }
    }
    count
}

fn spawn_error(e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::NotFound {
        TransportError::Other("ssh not found in PATH".to_string())
    } else {
        TransportError::Other(format!("failed to start ssh: {}", e))
    }
}

/// Private directory for a control socket
///
/// Lives under `/tmp` to stay within the unix socket path limit.
#[cfg(unix)]
fn create_socket_dir() -> std::io::Result<PathBuf> {
    use std::os::unix::fs::DirBuilderExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let mut builder = std::fs::DirBuilder::new();
    builder.mode(0o700);
    loop {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = PathBuf::from("/tmp").join(format!("sshtie-{}-{}", std::process::id(), n));
        match builder.create(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}
