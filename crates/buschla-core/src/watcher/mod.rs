/// Cross-process directory watcher.
///
/// The controller side lives here: [`DirWatcher`] spawns a worker process,
/// hands it a [`WatchConfig`], and drains the events it sends back without
/// ever blocking the caller. The worker side lives in [`worker`].
///
/// # Usage
///
/// ```ignore
/// let mut config = WatchConfig::new();
/// config.append_directory("/home/me/project")?;
/// let mut watcher = start_watcher(config)?;
/// // once per UI frame:
/// while let Some(event) = watcher.poll_event() {
///     handle(event);
/// }
/// ```
///
/// # Shutdown
///
/// [`DirWatcher::shutdown`] (or dropping the watcher) sends SIGTERM to the
/// worker. The controller also holds the worker's stdin open for as long as
/// it lives; the kernel closes that pipe when the controller process exits,
/// and the worker stops on end of file. A watcher may therefore be spawned
/// on one thread and used from another.
pub mod channel;
pub mod config;
pub mod packer;
pub mod protocol;
pub mod reaction;
pub mod worker;

pub use config::{ReactionConfig, WatchConfig, WorkerHandshake, MAX_DIRECTORIES};
pub use protocol::{EventKind, WatcherEvent};

use crate::error::WatcherError;
use channel::EventReceiver;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

/// Argument that switches the application binary into worker mode.
pub const WORKER_ARG: &str = "--dir-watcher-worker";

/// How to start the worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Re-run the current executable with [`WORKER_ARG`].
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?).arg(WORKER_ARG))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Controller handle to a running watcher worker.
pub struct DirWatcher {
    /// `None` after shutdown.
    receiver: Option<EventReceiver>,
    worker: Option<Child>,
    directories: Vec<PathBuf>,
}

impl DirWatcher {
    /// Spawn a worker for `config` and return once it has its handshake.
    ///
    /// Directories are not checked here; the worker logs and skips any it
    /// cannot watch.
    pub fn spawn(config: WatchConfig, command: &WorkerCommand) -> Result<Self, WatcherError> {
        let (receiver, write_end) = channel::pipe()?;

        // The Command owns our copy of the write end and drops it when this
        // block ends, leaving the worker as the only writer.
        let mut worker = {
            let mut cmd = Command::new(&command.program);
            cmd.args(&command.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::from(write_end))
                .stderr(Stdio::inherit());
            cmd.spawn().map_err(|source| WatcherError::Spawn {
                program: command.program.clone(),
                source,
            })?
        };

        let handshake = WorkerHandshake {
            controller_pid: std::process::id(),
            config,
        };
        // stdin stays open afterwards as the worker's lifeline. `Child::wait`
        // closes it, so reaping the worker also releases it.
        let sent = match worker.stdin.as_mut() {
            Some(stdin) => serde_json::to_writer(&mut *stdin, &handshake)
                .and_then(|()| stdin.write_all(b"\n").map_err(serde_json::Error::io)),
            None => Ok(()),
        };
        if let Err(e) = sent {
            let _ = worker.kill();
            let _ = worker.wait();
            return Err(WatcherError::Handshake(e));
        }

        info!(
            "Watcher: started worker {} for {} directories",
            worker.id(),
            handshake.config.directories().len()
        );

        Ok(Self {
            receiver: Some(receiver),
            worker: Some(worker),
            directories: handshake.config.directories().to_vec(),
        })
    }

    /// Next pending event, or `None` if there is nothing to deliver now.
    /// Never blocks. At most one event per call.
    pub fn poll_event(&mut self) -> Option<WatcherEvent> {
        self.receiver.as_mut()?.poll()
    }

    /// `true` once no more events can arrive: after shutdown, or after the
    /// worker exited and the channel drained.
    pub fn is_closed(&self) -> bool {
        self.receiver.as_ref().map_or(true, EventReceiver::is_closed)
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.worker.as_ref().map(Child::id)
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Stop the worker and close the channel. Safe to call more than once.
    ///
    /// Undelivered events are discarded. The worker is reaped on a
    /// background thread if it does not exit straight away.
    pub fn shutdown(&mut self) {
        self.receiver = None;
        let Some(mut worker) = self.worker.take() else {
            return;
        };

        let pid = Pid::from_raw(worker.id() as i32);
        drop(worker.stdin.take());
        match worker.try_wait() {
            Ok(Some(status)) => {
                debug!("Watcher: worker {} already exited ({})", pid, status);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!("Watcher: could not query worker {}: {}", pid, e),
        }

        if let Err(e) = kill(pid, Signal::SIGTERM) {
            warn!("Watcher: failed to signal worker {}: {}", pid, e);
        }

        let reaper = thread::Builder::new()
            .name("buschla-watcher-reaper".into())
            .spawn(move || match worker.wait() {
                Ok(status) => debug!("Watcher: worker {} exited ({})", pid, status),
                Err(e) => warn!("Watcher: failed to reap worker {}: {}", pid, e),
            });
        if let Err(e) = reaper {
            warn!("Watcher: could not start reaper thread: {}", e);
        }
        info!("Watcher: shut down");
    }
}

impl Drop for DirWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start a watcher whose worker is this same executable run with
/// [`WORKER_ARG`].
pub fn start_watcher(config: WatchConfig) -> Result<DirWatcher, WatcherError> {
    let command = WorkerCommand::current_exe().map_err(|source| WatcherError::Spawn {
        program: PathBuf::from(WORKER_ARG),
        source,
    })?;
    DirWatcher::spawn(config, &command)
}
