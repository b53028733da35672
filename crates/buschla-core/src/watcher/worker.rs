/// Watcher worker process.
///
/// Runs in its own OS process so a crash in the watcher or in the build
/// command can never take the controller down with it. The worker reads
/// its [`WorkerHandshake`] from stdin, writes event buffers to stdout, and
/// logs to stderr. The controller keeps stdin open for as long as it runs;
/// end of file there means the controller process is gone.
///
/// # Lifecycle
///
/// 1. Claim stdout as the event channel and point fd 1 at stderr.
/// 2. Read the handshake, start the stdin lifeline, arm `PR_SET_PDEATHSIG`
///    and confirm the parent.
/// 3. Add one `IN_CLOSE_WRITE` watch per configured directory, in order.
///    A directory that cannot be watched is logged and skipped.
/// 4. Loop: wait for a batch of inotify records, pack the changed paths,
///    send them, then run the build reaction if any path asked for one.
/// 5. Exit on SIGTERM/SIGINT, on controller death, or when the channel
///    breaks.
use crate::error::{PackError, WatcherError};
use crate::watcher::channel::EventSender;
use crate::watcher::config::{ReactionConfig, WatchConfig, WorkerHandshake};
use crate::watcher::packer::PathPacker;
use crate::watcher::protocol::encode_reaction_report;
use crate::watcher::reaction::run_reaction;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, InotifyEvent, WatchDescriptor};
use nix::sys::prctl;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::fd::AsFd;
use std::io::{ErrorKind, Read};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, error, info, warn};

/// Set by the signal handler or the stdin lifeline; checked between
/// inotify waits and while a build runs.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Set when the parent-death signal arrives. The main loop confirms it
/// against `getppid` before acting on it.
static PARENT_SIGNALLED: AtomicBool = AtomicBool::new(false);

/// Upper bound on how long a shutdown request can go unnoticed while idle.
const POLL_INTERVAL_MS: u16 = 250;

extern "C" fn request_shutdown(_signal: nix::libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

extern "C" fn note_parent_signal(_signal: nix::libc::c_int) {
    PARENT_SIGNALLED.store(true, Ordering::SeqCst);
}

/// Entry point of the worker process.
///
/// Returns once the worker has been asked to stop or can no longer reach
/// its controller.
pub fn run_worker_process() -> Result<(), WatcherError> {
    let mut sender = claim_channel()?;

    let handshake = read_handshake()?;

    install_shutdown_handler()?;
    start_lifeline()?;
    guard_parent(handshake.controller_pid)?;

    let inotify = Inotify::init(InitFlags::IN_CLOEXEC).map_err(WatcherError::Notify)?;
    let table = WatchTable::establish(&inotify, handshake.config.directories());

    let result = run_loop(
        &inotify,
        &table,
        &handshake.config,
        handshake.controller_pid,
        &mut sender,
    );
    table.release(&inotify);

    match &result {
        Ok(()) => info!("Worker: shutting down"),
        Err(e) => error!("Worker: stopping: {}", e),
    }
    result
}

/// Take a private copy of stdout for the event channel, then redirect fd 1
/// to stderr so a stray print can never corrupt the byte stream.
fn claim_channel() -> Result<EventSender, WatcherError> {
    let channel = std::io::stdout()
        .as_fd()
        .try_clone_to_owned()
        .map_err(WatcherError::ClaimChannel)?;
    if let Err(e) = nix::unistd::dup2_stdout(std::io::stderr()) {
        warn!("Worker: could not redirect stdout to stderr: {}", e);
    }
    Ok(EventSender::new(channel))
}

/// Read exactly one JSON handshake from stdin without waiting for end of
/// file, so the controller can keep the pipe open afterwards.
fn read_handshake() -> Result<WorkerHandshake, WatcherError> {
    let stdin = std::io::stdin().lock();
    serde_json::Deserializer::from_reader(stdin)
        .into_iter::<WorkerHandshake>()
        .next()
        .ok_or(WatcherError::HandshakeMissing)?
        .map_err(WatcherError::Handshake)
}

/// Block on stdin in the background and request shutdown once the
/// controller's end closes. The kernel closes it when the controller
/// process exits, whichever of its threads spawned us.
fn start_lifeline() -> Result<(), WatcherError> {
    thread::Builder::new()
        .name("buschla-lifeline".into())
        .spawn(|| {
            let mut stdin = std::io::stdin().lock();
            let mut sink = [0u8; 64];
            loop {
                match stdin.read(&mut sink) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => {
                        debug!("Worker: lifeline read failed: {}", e);
                        break;
                    }
                }
            }
            info!("Worker: controller closed the lifeline");
            SHUTDOWN.store(true, Ordering::SeqCst);
        })
        .map_err(WatcherError::Lifeline)?;
    Ok(())
}

fn install_shutdown_handler() -> Result<(), WatcherError> {
    // No SA_RESTART: a pending wait returns EINTR and the loop re-checks
    // the flag immediately.
    let action = SigAction::new(
        SigHandler::Handler(request_shutdown),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGTERM, Signal::SIGINT] {
        // SAFETY: the handler only stores to an atomic, which is
        // async-signal-safe.
        unsafe { sigaction(signal, &action) }.map_err(WatcherError::Worker)?;
    }
    Ok(())
}

/// Backstop for the lifeline, then make sure the parent has not already
/// died before either was in place.
///
/// `PR_SET_PDEATHSIG` fires when the *thread* that forked us exits, which
/// may happen while the controller process lives on. The signal therefore
/// only raises [`PARENT_SIGNALLED`]; [`parent_alive`] has the final say.
fn guard_parent(controller_pid: u32) -> Result<(), WatcherError> {
    let action = SigAction::new(
        SigHandler::Handler(note_parent_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only stores to an atomic.
    unsafe { sigaction(Signal::SIGUSR1, &action) }.map_err(WatcherError::Worker)?;
    prctl::set_pdeathsig(Signal::SIGUSR1).map_err(WatcherError::Worker)?;

    if !parent_alive(controller_pid) {
        return Err(WatcherError::ControllerGone(controller_pid));
    }
    Ok(())
}

/// `true` while we are still parented by the controller process.
fn parent_alive(controller_pid: u32) -> bool {
    let parent = nix::unistd::getppid().as_raw();
    parent >= 0 && parent as u32 == controller_pid
}

/// Maps inotify watch descriptors to their directory's index in the
/// [`WatchConfig`]. Built once at startup and never changed.
pub struct WatchTable {
    entries: HashMap<WatchDescriptor, usize>,
}

impl WatchTable {
    fn establish(inotify: &Inotify, directories: &[PathBuf]) -> Self {
        let mut entries = HashMap::with_capacity(directories.len());
        for (index, dir) in directories.iter().enumerate() {
            match inotify.add_watch(dir.as_path(), AddWatchFlags::IN_CLOSE_WRITE) {
                Ok(wd) => {
                    // The kernel hands out the same descriptor for a
                    // directory listed twice; the first listing wins.
                    entries.entry(wd).or_insert(index);
                    info!("Worker: watching '{}'", dir.display());
                }
                Err(e) => warn!("Worker: cannot watch '{}': {}", dir.display(), e),
            }
        }

        if entries.is_empty() && !directories.is_empty() {
            error!("Worker: none of the {} directories could be watched", directories.len());
        }
        Self { entries }
    }

    pub fn directory_index(&self, wd: WatchDescriptor) -> Option<usize> {
        self.entries.get(&wd).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn release(&self, inotify: &Inotify) {
        for wd in self.entries.keys() {
            if let Err(e) = inotify.rm_watch(*wd) {
                debug!("Worker: rm_watch failed: {}", e);
            }
        }
    }
}

fn run_loop(
    inotify: &Inotify,
    table: &WatchTable,
    config: &WatchConfig,
    controller_pid: u32,
    sender: &mut EventSender,
) -> Result<(), WatcherError> {
    let mut packer = PathPacker::new();

    while !SHUTDOWN.load(Ordering::SeqCst) {
        if PARENT_SIGNALLED.swap(false, Ordering::SeqCst) {
            if !parent_alive(controller_pid) {
                info!("Worker: controller {} exited", controller_pid);
                break;
            }
            debug!("Worker: spawning thread exited, controller still running");
        }

        if !wait_readable(inotify)? {
            continue;
        }

        let events = match inotify.read_events() {
            Ok(events) => events,
            Err(Errno::EINTR) | Err(Errno::EAGAIN) => continue,
            Err(e) => return Err(WatcherError::Notify(e)),
        };

        let records = resolve_records(&events, table, config.directories());
        let batch = collect_batch(records, config.reaction(), &mut packer);
        for buffer in &batch.buffers {
            sender.write_event(buffer)?;
        }

        if batch.trigger_build {
            if let Some(reaction) = config.reaction() {
                run_and_report(reaction, sender)?;
            }
        }
    }
    Ok(())
}

/// Wait up to [`POLL_INTERVAL_MS`] for inotify to become readable.
fn wait_readable(inotify: &Inotify) -> Result<bool, WatcherError> {
    let mut fds = [PollFd::new(inotify.as_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(POLL_INTERVAL_MS)) {
        Ok(ready) => Ok(ready > 0),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(WatcherError::Notify(e)),
    }
}

fn run_and_report(reaction: &ReactionConfig, sender: &mut EventSender) -> Result<(), WatcherError> {
    match run_reaction(reaction, &SHUTDOWN) {
        Ok(outcome) if outcome.cancelled => {
            info!("Worker: build reaction cancelled by shutdown");
            Ok(())
        }
        Ok(outcome) => {
            sender.write_event(&encode_reaction_report(outcome.exit_status, &outcome.output))
        }
        Err(e) => {
            warn!("Worker: skipping build reaction: {}", e);
            Ok(())
        }
    }
}

/// One close-after-write notification, resolved against the watch table.
#[derive(Debug, Clone, Copy)]
pub struct ChangeRecord<'a> {
    /// Owning directory, or `None` if the descriptor is unknown.
    pub directory: Option<&'a Path>,
    /// File name as reported by the OS.
    pub name: &'a OsStr,
}

fn resolve_records<'a>(
    events: &'a [InotifyEvent],
    table: &WatchTable,
    directories: &'a [PathBuf],
) -> Vec<ChangeRecord<'a>> {
    events
        .iter()
        .filter_map(|event| {
            if event.mask.contains(AddWatchFlags::IN_Q_OVERFLOW) {
                warn!("Worker: inotify queue overflowed, some changes were lost");
                return None;
            }
            if event.mask.contains(AddWatchFlags::IN_IGNORED) {
                warn!("Worker: a watch was dropped by the kernel (directory removed?)");
                return None;
            }
            if !event.mask.contains(AddWatchFlags::IN_CLOSE_WRITE) {
                return None;
            }
            let name = event.name.as_deref()?;
            let directory = table
                .directory_index(event.wd)
                .and_then(|i| directories.get(i))
                .map(PathBuf::as_path);
            Some(ChangeRecord { directory, name })
        })
        .collect()
}

/// Event buffers produced from one batch of notification records.
#[derive(Debug, Default)]
pub struct Batch {
    /// Finished FileChanged buffers, in send order. Empty if nothing changed.
    pub buffers: Vec<Vec<u8>>,
    /// Number of paths packed across all buffers.
    pub paths: usize,
    /// At least one changed path matches the reaction's trigger list.
    pub trigger_build: bool,
}

/// Turn one batch of change records into FileChanged buffers.
///
/// Records are packed in delivery order. When the scratch buffer fills up
/// the current buffer is finished and packing continues in a fresh one, so
/// a large batch becomes several events rather than losing paths. A single
/// path too long for any buffer is dropped with a warning.
pub fn collect_batch<'a>(
    records: impl IntoIterator<Item = ChangeRecord<'a>>,
    reaction: Option<&ReactionConfig>,
    packer: &mut PathPacker,
) -> Batch {
    let mut batch = Batch::default();

    for record in records {
        if record.name.is_empty() {
            continue;
        }
        let path = match record.directory {
            Some(dir) => dir.join(record.name),
            None => PathBuf::from(record.name),
        };
        info!("Worker: file '{}' changed", path.display());

        if reaction.is_some_and(|r| r.should_trigger(&path)) {
            batch.trigger_build = true;
        }

        let bytes = path.as_os_str().as_bytes();
        let packed = match packer.push(bytes) {
            Err(PackError::Full) => {
                debug!("Worker: scratch buffer full after {} paths, rotating", packer.len());
                if let Some(buffer) = packer.finish() {
                    batch.buffers.push(buffer);
                }
                packer.push(bytes)
            }
            other => other,
        };
        match packed {
            Ok(()) => batch.paths += 1,
            Err(e) => warn!("Worker: dropping '{}': {}", path.display(), e),
        }
    }

    if let Some(buffer) = packer.finish() {
        batch.buffers.push(buffer);
    }
    batch
}
