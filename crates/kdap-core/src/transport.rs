//! The backend process handle (`spec.md` §1: "the subprocess manager for
//! the backend... out of scope"). Kept minimal: spawning lldb-dap and
//! splitting its stdio is not core logic, but the router needs a concrete
//! handle to hold onto so the backend process dies with the session.

use std::{path::PathBuf, time::Duration};

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::error::KdapError;

/// Launch configuration for the backend debugger process.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl BackendConfig {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        BackendConfig {
            binary: binary.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

/// A spawned backend process with its stdio split out. Holding `Child`
/// keeps `kill_on_drop` in effect, mirroring the teacher's `JsonRpcTransport`
/// child-ownership pattern.
pub struct BackendHandle {
    child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: Option<ChildStderr>,
}

impl BackendHandle {
    pub async fn spawn(config: &BackendConfig) -> Result<Self, KdapError> {
        let mut command = Command::new(&config.binary);
        command
            .args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &config.current_dir {
            command.current_dir(dir);
        }

        let mut child = spawn_with_retry(&mut command, &config.binary)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| KdapError::io("backend stdin", missing_pipe("stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| KdapError::io("backend stdout", missing_pipe("stdout")))?;
        let stderr = child.stderr.take();

        Ok(BackendHandle {
            child,
            stdin,
            stdout,
            stderr,
        })
    }

    /// Kills the backend process. Used by the session router's shutdown
    /// sequence after closing the backend-output channel fails to make the
    /// process exit on its own within a grace period.
    pub async fn kill(&mut self) -> Result<(), KdapError> {
        self.child
            .start_kill()
            .map_err(|source| KdapError::io("backend kill", source))
    }

    pub async fn wait(&mut self) -> Result<std::process::ExitStatus, KdapError> {
        self.child
            .wait()
            .await
            .map_err(|source| KdapError::io("backend wait", source))
    }
}

fn missing_pipe(which: &str) -> std::io::Error {
    std::io::Error::other(format!("backend child {which} unavailable"))
}

/// Retries spawn on a transient "file busy" error, identical in shape to the
/// teacher's `process::spawn_with_retry` (lldb-dap, like codex, can be
/// mid-write under a concurrent build/test harness).
fn spawn_with_retry(command: &mut Command, binary: &std::path::Path) -> Result<Child, KdapError> {
    let mut backoff = Duration::from_millis(2);
    for attempt in 0..5 {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => {
                let is_busy = matches!(source.kind(), std::io::ErrorKind::ExecutableFileBusy)
                    || source.raw_os_error() == Some(26);
                if is_busy && attempt < 4 {
                    std::thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, Duration::from_millis(50));
                    continue;
                }
                return Err(KdapError::io(
                    "backend spawn",
                    std::io::Error::new(
                        source.kind(),
                        format!("failed to spawn `{}`: {source}", binary.display()),
                    ),
                ));
            }
        }
    }
    unreachable!("spawn_with_retry should return before exhausting retries")
}
