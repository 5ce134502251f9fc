//! Process supervision: spawn, observe, stop.
//!
//! The supervisor owns the spawn/stop lifecycle of exactly one process per
//! [`SessionKey`] and is the only writer of lifecycle state in the
//! [`SessionRegistry`]. Children are spawned detached from the parent's
//! console (stdin discarded, stdout/stderr piped into telemetry readers)
//! and observed by a monitor task awaiting their exit, so the supervisor
//! itself never blocks on a process.

pub mod registry;
pub mod session;

use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use crate::launch::{self, LaunchError};
use crate::telemetry;

pub use registry::SessionRegistry;
pub use session::{Lifecycle, MetricsSnapshot, SessionKey, SessionRecord};

use registry::Generation;

/// Errors reported synchronously by [`Supervisor::start`]. When any of
/// these is returned, no session record exists and no process was left
/// behind.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("session {0} is already running")]
    AlreadyRunning(SessionKey),

    #[error("binary not found: {}", .0.display())]
    BinaryMissing(PathBuf),

    #[error(transparent)]
    InvalidIdentity(#[from] LaunchError),

    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Everything needed to launch one session.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub key: SessionKey,
    /// Verified binary to execute.
    pub binary: PathBuf,
    /// Argument vector, passed to the OS as-is.
    pub args: Vec<String>,
    /// Working directory; inherited when absent.
    pub cwd: Option<PathBuf>,
    /// Identifying parameter (payout address) to sanity-check before any
    /// spawn attempt. Skipped when the workload has none.
    pub identity: Option<String>,
}

/// Owns the session registry and the lifecycle of every supervised process.
///
/// Construct one per application instance and share it; all methods take
/// `&self`. `start` must be called from within a Tokio runtime, since it
/// spawns the monitor and telemetry reader tasks.
#[derive(Clone, Default)]
pub struct Supervisor {
    registry: SessionRegistry,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            registry: SessionRegistry::new(),
        }
    }

    /// Read access to the underlying registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Launch a session.
    ///
    /// Rejected before any spawn attempt when the key is already active
    /// (no silent supersede), the binary is missing on disk, or the
    /// identifying parameter fails its sanity check. On success the record
    /// is `Running` with a zeroed metrics snapshot before this returns.
    pub fn start(&self, request: StartRequest) -> Result<(), StartError> {
        if let Some(identity) = &request.identity {
            launch::validate_identity(identity)?;
        }
        if !request.binary.is_file() {
            return Err(StartError::BinaryMissing(request.binary));
        }

        let Some(generation) = self
            .registry
            .try_reserve(&request.key, request.binary.clone())
        else {
            return Err(StartError::AlreadyRunning(request.key));
        };

        let mut command = Command::new(&request.binary);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                self.registry.abort_start(&request.key, generation);
                error!(key = %request.key, binary = %request.binary.display(), error = %err, "spawn failed");
                return Err(StartError::Spawn(err));
            }
        };

        let pid = child.id();
        self.registry.promote(&request.key, generation, pid);
        info!(key = %request.key, pid, binary = %request.binary.display(), "session started");

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(telemetry::pump(
                stdout,
                self.registry.clone(),
                request.key.clone(),
                generation,
                "stdout",
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(telemetry::pump(
                stderr,
                self.registry.clone(),
                request.key.clone(),
                generation,
                "stderr",
            ));
        }
        tokio::spawn(monitor(
            child,
            self.registry.clone(),
            request.key.clone(),
            generation,
        ));
        Ok(())
    }

    /// Best-effort stop: signal the process and deregister immediately.
    ///
    /// Does not wait for the process to die; a subsequent `start` under the
    /// same key is allowed right away. Callers needing confirmation poll
    /// [`Supervisor::is_running`]. Returns the final record, or `None` when
    /// no session held the key.
    pub fn stop(&self, key: &SessionKey) -> Option<SessionRecord> {
        let mut record = self.registry.remove(key)?;
        if record.state.is_active()
            && let Some(pid) = record.pid
        {
            terminate(pid);
        }
        record.state = Lifecycle::Stopped;
        record.metrics.active = false;
        info!(key = %key, pid = record.pid, "session stopped");
        Some(record)
    }

    /// Current record for `key`, terminal states included. Pure read.
    pub fn status(&self, key: &SessionKey) -> Option<SessionRecord> {
        self.registry.get(key)
    }

    /// Whether an active session holds `key`. Pure read.
    pub fn is_running(&self, key: &SessionKey) -> bool {
        self.registry.is_running(key)
    }

    /// Snapshot of every session, active and terminal.
    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.registry.snapshot()
    }

    /// Stop every active session. Used on application shutdown.
    pub fn shutdown(&self) {
        for key in self.registry.active_keys() {
            self.stop(&key);
        }
    }
}

/// Await the child's exit and record the terminal transition.
///
/// When the session was stopped or replaced in the meantime the transition
/// is a no-op; the task still reaps the child either way.
async fn monitor(mut child: Child, registry: SessionRegistry, key: SessionKey, generation: Generation) {
    match child.wait().await {
        Ok(status) => {
            if registry.mark_exited(&key, generation, status.code()) {
                info!(key = %key, code = status.code(), "process exited");
            }
        }
        Err(err) => {
            warn!(key = %key, error = %err, "failed to observe process exit");
            registry.mark_failed(&key, generation, err.to_string());
        }
    }
}

/// Graceful termination by pid: SIGTERM on Unix, `taskkill` on Windows.
/// Errors are ignored; the process may already be gone.
fn terminate(pid: u32) {
    #[cfg(unix)]
    {
        let _ = std::process::Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .output();
    }

    #[cfg(windows)]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .output();
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
    }
}
