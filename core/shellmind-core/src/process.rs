//! Child-process helpers shared by the probe, commit and setup paths.
//!
//! Every external command runs under an explicit deadline. Output is drained
//! on reader threads so a chatty child (a large `git diff`) cannot fill its
//! pipe and stall before the deadline check.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Result, ShellmindError};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Directories searched after PATH. Login shells on macOS often start
/// without Homebrew on PATH.
const FALLBACK_DIRS: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin", "/usr/bin"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Locates `binary` on PATH (or the fallback dirs). Paths containing a
/// separator are checked as-is.
pub fn which(binary: &str) -> Option<PathBuf> {
    if binary.contains('/') {
        let path = PathBuf::from(binary);
        return is_executable(&path).then_some(path);
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&path_var)
        .chain(FALLBACK_DIRS.iter().map(PathBuf::from))
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Runs `command` to completion or kills it at `timeout`.
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<CommandOutput> {
    let label = describe(command);
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ShellmindError::CommandFailed {
            command: label.clone(),
            details: e.to_string(),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_deadline(&mut child, timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(command = %label, ?timeout, "Killed command at deadline");
            return Err(ShellmindError::Timeout(timeout));
        }
        Err(e) => {
            return Err(ShellmindError::CommandFailed {
                command: label,
                details: e.to_string(),
            })
        }
    };

    Ok(CommandOutput {
        code: status.code(),
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

fn wait_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Spawns `command` in its own session with stdio detached, appending
/// stdout/stderr to `log` when given. The child is never waited on.
pub fn spawn_detached(command: &mut Command, log: Option<&Path>) -> Result<u32> {
    let label = describe(command);
    command.stdin(Stdio::null());
    match log.map(open_log).transpose()? {
        Some(file) => {
            let err_file = file
                .try_clone()
                .map_err(|e| ShellmindError::io("cloning log handle", e))?;
            command.stdout(Stdio::from(file)).stderr(Stdio::from(err_file));
        }
        None => {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // SAFETY: setsid is async-signal-safe and touches no parent state.
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let child = command.spawn().map_err(|e| ShellmindError::CommandFailed {
        command: label,
        details: e.to_string(),
    })?;
    Ok(child.id())
}

fn open_log(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent)
            .map_err(|e| ShellmindError::io(format!("creating {}", parent.display()), e))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ShellmindError::io(format!("opening {}", path.display()), e))
}

/// Returns true if a process with this PID exists. Pids that `kill` would
/// read as a process group (0, or anything past `i32::MAX`) are never alive.
pub fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        match i32::try_from(pid) {
            Ok(pid) if pid > 0 => unsafe { libc::kill(pid, 0) == 0 },
            _ => false,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

fn describe(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(command.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}
