//! Matcher process invocation
//!
//! Spawns the external matcher with piped stdout/stderr, drains both
//! streams into per-run buffers as chunks arrive, and reports one
//! [`Completion`] when the process ends. A spawn failure is reported through
//! the same completion, so callers only ever wait on one signal.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::logger;

const READ_CHUNK: usize = 4096;

/// After a forced kill, how long to keep draining pipes still held open by
/// grandchildren before giving up on the remaining output.
const KILLED_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Program, arguments and working directory of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

/// Terminal state of one run
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// `None` when the process never started or died from a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Set when the run was terminated through its [`KillHandle`]
    pub killed: bool,
}

impl Completion {
    fn spawn_failed(program: &str, err: &io::Error) -> Self {
        Self {
            exit_code: None,
            stdout: Vec::new(),
            stderr: format!("failed to start '{program}': {err}").into_bytes(),
            killed: false,
        }
    }

    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Requests forced termination of a run
#[derive(Debug, Clone)]
pub struct KillHandle(Arc<Notify>);

impl KillHandle {
    /// Kill the process; a no-op once it has already exited.
    /// The request is remembered if the watcher is not polling yet.
    pub fn kill(&self) {
        self.0.notify_one();
    }
}

enum RunState {
    Spawned {
        child: Child,
        stdout: Option<JoinHandle<Vec<u8>>>,
        stderr: Option<JoinHandle<Vec<u8>>>,
    },
    Failed(Completion),
}

/// One matcher invocation, owned by a single request
pub struct ProcessRun {
    pid: Option<u32>,
    kill: Arc<Notify>,
    state: RunState,
}

impl ProcessRun {
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn kill_handle(&self) -> KillHandle {
        KillHandle(Arc::clone(&self.kill))
    }

    /// Wait for the process to end (or be killed) and collect both buffers.
    ///
    /// Always reaps the child, so a killed run leaves no zombie behind.
    pub async fn wait(self) -> Completion {
        let (mut child, stdout, stderr) = match self.state {
            RunState::Failed(completion) => return completion,
            RunState::Spawned {
                child,
                stdout,
                stderr,
            } => (child, stdout, stderr),
        };

        let mut killed = false;
        let status = tokio::select! {
            status = child.wait() => status,
            () = self.kill.notified() => {
                killed = true;
                if let Err(e) = child.start_kill() {
                    logger::log_warning(&format!(
                        "Failed to kill matcher pid {:?}: {e}",
                        self.pid
                    ));
                }
                child.wait().await
            }
        };

        let exit_code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                logger::log_error(&format!("Failed to wait for matcher: {e}"));
                None
            }
        };
        logger::log_info(&format!(
            "[Matcher] pid {:?} exited (code {exit_code:?}, killed {killed})",
            self.pid
        ));

        Completion {
            exit_code,
            stdout: collect(stdout, killed).await,
            stderr: collect(stderr, killed).await,
            killed,
        }
    }
}

/// Start `invocation`. Never fails: a spawn error becomes a failed
/// [`Completion`] returned by [`ProcessRun::wait`].
pub fn invoke(invocation: &Invocation) -> ProcessRun {
    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &invocation.cwd {
        command.current_dir(dir);
    }

    match command.spawn() {
        Ok(mut child) => {
            let pid = child.id();
            let stdout = child.stdout.take().map(|s| tokio::spawn(drain(s)));
            let stderr = child.stderr.take().map(|s| tokio::spawn(drain(s)));
            logger::log_info(&format!(
                "[Matcher] Spawned '{}' (pid {})",
                invocation.program,
                pid.map_or_else(|| "?".to_string(), |p| p.to_string())
            ));
            ProcessRun {
                pid,
                kill: Arc::new(Notify::new()),
                state: RunState::Spawned {
                    child,
                    stdout,
                    stderr,
                },
            }
        }
        Err(e) => {
            logger::log_error(&format!(
                "Failed to spawn matcher '{}': {e}",
                invocation.program
            ));
            ProcessRun {
                pid: None,
                kill: Arc::new(Notify::new()),
                state: RunState::Failed(Completion::spawn_failed(&invocation.program, &e)),
            }
        }
    }
}

/// Append chunks from `reader` in arrival order until EOF
async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) => {
                logger::log_warning(&format!("Matcher stream read failed: {e}"));
                break;
            }
        }
    }
    buffer
}

async fn collect(handle: Option<JoinHandle<Vec<u8>>>, killed: bool) -> Vec<u8> {
    let Some(mut handle) = handle else {
        return Vec::new();
    };
    if !killed {
        return handle.await.unwrap_or_default();
    }
    match tokio::time::timeout(KILLED_DRAIN_GRACE, &mut handle).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            handle.abort();
            Vec::new()
        }
    }
}
