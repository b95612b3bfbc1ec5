//! Runs an external command to completion with an optional timeout.
//!
//! stdout and stderr are drained on reader threads so a chatty child never
//! blocks on a full pipe. A command with a timeout runs in its own process
//! group on unix; on expiry the whole group is killed and the reader threads
//! are abandoned, since a surviving grandchild may still hold the pipes.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error};

use crate::error::{
    CoreError, CoreResult, command_failed_error, command_start_error, command_wait_error,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Collected output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Logs the command line at debug level.
pub fn log_command(cmd: &Command) {
    let args: Vec<String> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    debug!(
        "Running: {} {}",
        cmd.get_program().to_string_lossy(),
        args.join(" ")
    );
}

fn spawn_line_reader<R: Read + Send + 'static>(
    stream: Option<R>,
    label: &'static str,
) -> Option<JoinHandle<Vec<String>>> {
    let stream = stream?;
    Some(std::thread::spawn(move || {
        let mut lines = Vec::new();
        for line in BufReader::new(stream).lines().map_while(Result::ok) {
            debug!("{label}: {line}");
            lines.push(line);
        }
        lines
    }))
}

fn wait_with_timeout(
    child: &mut Child,
    name: &str,
    timeout: Option<Duration>,
) -> CoreResult<ExitStatus> {
    let Some(timeout) = timeout else {
        return child.wait().map_err(|e| command_wait_error(name, e));
    };

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if start.elapsed() >= timeout => {
                kill_process_group(child);
                let _ = child.kill();
                let _ = child.wait();
                error!("{name} timed out after {:.0}s, killed", timeout.as_secs_f64());
                return Err(CoreError::CommandTimeout(name.to_string(), timeout));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(command_wait_error(name, e)),
        }
    }
}

/// Kills every process in the child's group, grandchildren included.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let group = format!("-{}", child.id());
    let result = Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = result {
        debug!("Could not signal process group {group}: {e}");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

/// Executes `cmd`, failing on spawn error, timeout or non-zero exit.
///
/// The failure carries the command's stderr verbatim.
pub fn run_command_with_timeout(
    cmd: &mut Command,
    name: &str,
    timeout: Option<Duration>,
) -> CoreResult<CommandOutput> {
    log_command(cmd);

    #[cfg(unix)]
    if timeout.is_some() {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| command_start_error(name, e))?;

    let stdout_handle = spawn_line_reader(child.stdout.take(), "STDOUT");
    let stderr_handle = spawn_line_reader(child.stderr.take(), "STDERR");

    let status = match wait_with_timeout(&mut child, name, timeout) {
        // Readers are detached; they end when the last pipe holder exits.
        Err(e @ CoreError::CommandTimeout(..)) => return Err(e),
        other => other,
    };

    let stdout = stdout_handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr = stderr_handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    let status = status?;
    if !status.success() {
        let stderr_text = stderr.join("\n");
        error!("{name} failed with {status}: {stderr_text}");
        return Err(command_failed_error(name, status, stderr_text));
    }

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}
