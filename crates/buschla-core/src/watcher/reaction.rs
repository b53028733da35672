/// Build reaction runner.
///
/// Runs the configured build command once per triggering batch and
/// captures everything it prints on stdout and stderr into one buffer.
///
/// The command gets its own capture pipe as stdout and stderr; the
/// worker's own streams are never reassigned, so they are intact no matter
/// how the run ends. The command runs in its own process group so a
/// timeout or a worker shutdown can kill `make` and everything it started.
use crate::error::ReactionError;
use crate::watcher::config::ReactionConfig;
use crate::watcher::protocol::MAX_CAPTURE;
use crossbeam_channel::{bounded, RecvTimeoutError};
use nix::fcntl::OFlag;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How often the runner re-checks the cancel flag and the deadline.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// How long to wait for the capture pipe to close after killing the group.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Result of one build reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionOutcome {
    /// Exit code, or `128 + signal` if the command was killed.
    pub exit_status: i32,
    /// Combined stdout/stderr, at most [`MAX_CAPTURE`] bytes.
    pub output: Vec<u8>,
    /// The command was killed because it exceeded its timeout.
    pub timed_out: bool,
    /// The command was killed because the worker is shutting down.
    pub cancelled: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum KillReason {
    Timeout,
    Cancelled,
}

/// Run `config.command` under `sh -c` and capture its combined output.
///
/// Blocks until the command exits. Setting `cancel` kills the command's
/// process group within [`WAIT_SLICE`].
pub fn run_reaction(
    config: &ReactionConfig,
    cancel: &AtomicBool,
) -> Result<ReactionOutcome, ReactionError> {
    let (read_end, write_end) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| ReactionError::CaptureChannel(e.into()))?;
    let stderr_end = write_end
        .try_clone()
        .map_err(ReactionError::CaptureChannel)?;

    info!("Worker: running build reaction '{}'", config.command);
    let started = Instant::now();

    // The command owns our copies of the write end; dropping it at the end
    // of this block leaves the child as the only writer, so the capture
    // reader sees EOF once the child and its descendants are done.
    let mut child = {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&config.command)
            .stdin(Stdio::null())
            .stdout(Stdio::from(write_end))
            .stderr(Stdio::from(stderr_end))
            .process_group(0);
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }
        command.spawn().map_err(|source| ReactionError::Spawn {
            command: config.command.clone(),
            source,
        })?
    };

    let (tx, rx) = bounded::<Vec<u8>>(1);
    let input = File::from(read_end);
    let spawned = thread::Builder::new()
        .name("buschla-reaction-capture".into())
        .spawn(move || {
            let _ = tx.send(capture(input));
        });
    if let Err(e) = spawned {
        kill_group(&child);
        let _ = child.wait();
        return Err(ReactionError::CaptureChannel(e));
    }

    let deadline = config.timeout.map(|t| started + t);
    let mut killed: Option<(KillReason, Instant)> = None;

    let mut output = loop {
        match rx.recv_timeout(WAIT_SLICE) {
            Ok(output) => break output,
            Err(RecvTimeoutError::Disconnected) => break Vec::new(),
            Err(RecvTimeoutError::Timeout) => {}
        }

        match killed {
            Some((_, at)) => {
                if at.elapsed() >= KILL_GRACE {
                    warn!("Worker: capture pipe still open after kill, giving up on output");
                    break Vec::new();
                }
            }
            None => {
                let reason = if cancel.load(Ordering::Relaxed) {
                    Some(KillReason::Cancelled)
                } else if deadline.is_some_and(|d| Instant::now() >= d) {
                    Some(KillReason::Timeout)
                } else {
                    None
                };
                if let Some(reason) = reason {
                    kill_group(&child);
                    killed = Some((reason, Instant::now()));
                }
            }
        }
    };

    let status = child.wait().map_err(ReactionError::Wait)?;
    let exit_status = exit_code(status);
    let timed_out = matches!(killed, Some((KillReason::Timeout, _)));
    let cancelled = matches!(killed, Some((KillReason::Cancelled, _)));

    if timed_out {
        let secs = config.timeout.map_or(0, |t| t.as_secs());
        output.extend_from_slice(format!("\n[reaction timed out after {secs}s]\n").as_bytes());
    }

    info!(
        "Worker: build reaction exited with {} after {:.1}s ({} bytes of output)",
        exit_status,
        started.elapsed().as_secs_f64(),
        output.len()
    );

    Ok(ReactionOutcome {
        exit_status,
        output,
        timed_out,
        cancelled,
    })
}

/// Read the capture pipe to EOF, keeping at most [`MAX_CAPTURE`] bytes.
///
/// Bytes past the limit are read and discarded so the command never stalls
/// on a full pipe.
fn capture(mut input: File) -> Vec<u8> {
    let mut output = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match input.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let room = MAX_CAPTURE.saturating_sub(output.len());
                output.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Worker: reading build output failed: {}", e);
                break;
            }
        }
    }
    output
}

fn kill_group(child: &Child) {
    // The child is its own group leader, so its pid is the group id.
    let group = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(group, Signal::SIGKILL) {
        warn!("Worker: failed to kill build process group {}: {}", group, e);
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}
