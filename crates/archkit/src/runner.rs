//! Archive command execution
//!
//! Commands run through the platform shell with stdout and stderr
//! captured. A runner can enforce a timeout and honours a shared
//! [`CancelToken`].

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Exit code recorded when a command exceeds its timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code recorded when a command is killed by cancellation
pub const CANCELLED_EXIT_CODE: i32 = 130;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How a cancelled run treats work in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelMode {
    /// Start no new targets, let running commands finish
    Finish,
    /// Start no new targets and kill running commands
    Kill,
}

/// Shared run-level cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<AtomicU8>,
}

impl CancelToken {
    const ACTIVE: u8 = 0;
    const FINISH: u8 = 1;
    const KILL: u8 = 2;

    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; a later `Kill` upgrades an earlier `Finish`
    pub fn cancel(&self, mode: CancelMode) {
        let value = match mode {
            CancelMode::Finish => Self::FINISH,
            CancelMode::Kill => Self::KILL,
        };
        self.state.fetch_max(value, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::SeqCst) != Self::ACTIVE
    }

    /// Whether running commands should be killed
    pub fn should_kill(&self) -> bool {
        self.state.load(Ordering::SeqCst) == Self::KILL
    }
}

/// Why a command stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own (possibly through a signal)
    Exited,
    /// Killed after exceeding the timeout
    TimedOut,
    /// Killed by run cancellation
    Cancelled,
}

/// Captured result of one command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub termination: Termination,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs archive commands
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run a shell command line in `cwd` and capture its output
    pub fn run(&self, command: &str, cwd: &Path, cancel: &CancelToken) -> std::io::Result<CommandOutput> {
        log::debug!("Running in {}: {}", cwd.display(), command);
        let mut child = shell(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let started = Instant::now();
        let (status, termination) = loop {
            if let Some(status) = child.try_wait()? {
                break (Some(status), Termination::Exited);
            }
            if cancel.should_kill() {
                kill(&mut child);
                break (None, Termination::Cancelled);
            }
            if self.timeout.is_some_and(|limit| started.elapsed() >= limit) {
                kill(&mut child);
                break (None, Termination::TimedOut);
            }
            thread::sleep(POLL_INTERVAL);
        };

        let exit_code = match termination {
            Termination::Exited => status.map(exit_code).unwrap_or(-1),
            Termination::TimedOut => TIMEOUT_EXIT_CODE,
            Termination::Cancelled => CANCELLED_EXIT_CODE,
        };

        Ok(CommandOutput {
            exit_code,
            stdout: collect(stdout),
            stderr: collect(stderr),
            termination,
        })
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    use std::os::unix::process::CommandExt;
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    // Own process group so a kill reaches the command's children too
    cmd.process_group(0);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(unix)]
fn kill(child: &mut Child) {
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: signalling the process group created for this child
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(windows)]
fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// A signal-terminated child has no exit code
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
