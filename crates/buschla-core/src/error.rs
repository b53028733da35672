/// Error types for the watcher pipeline.
///
/// None of these ever cross the process boundary. Inside the worker they
/// become a log line, a skipped action, or process exit; on the controller
/// side they degrade the watcher to "no more events".
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting up or running the watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("watch config is full ({max} directories), cannot add '{}'", path.display())]
    TooManyDirectories { max: usize, path: PathBuf },

    #[error("failed to create IPC channel: {0}")]
    Channel(#[source] nix::Error),

    #[error("failed to spawn watcher worker '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to exchange worker handshake: {0}")]
    Handshake(#[source] serde_json::Error),

    #[error("stdin closed before the worker handshake arrived")]
    HandshakeMissing,

    #[error("failed to start the controller lifeline: {0}")]
    Lifeline(#[source] io::Error),

    #[error("failed to initialise inotify: {0}")]
    Notify(#[source] nix::Error),

    /// The worker started after its controller already exited.
    #[error("controller process {0} is gone")]
    ControllerGone(u32),

    #[error("failed to claim stdout as the event channel: {0}")]
    ClaimChannel(#[source] io::Error),

    #[error("failed to write event to channel: {0}")]
    Send(#[source] io::Error),

    #[error("worker process failed: {0}")]
    Worker(#[source] nix::Error),
}

/// Errors raised while decoding an event buffer on the controller side.
///
/// A protocol error is fatal for the offending event only, except
/// [`ProtocolError::FrameLength`] which leaves the byte stream unframed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("event buffer truncated: {len} bytes, need at least {need}")]
    Truncated { len: usize, need: usize },

    #[error("event buffer declares length {0}, outside the valid range")]
    FrameLength(usize),

    #[error("event buffer declares length {declared} but holds {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unknown event kind 0x{0:x}")]
    UnknownKind(u32),

    #[error("string offset {offset} outside event buffer of {len} bytes")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("string at offset {0} is not NUL-terminated")]
    Unterminated(usize),
}

/// Errors raised while packing changed paths into a scratch buffer.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PackError {
    /// No room left between the offset table and the packed strings.
    #[error("scratch buffer full")]
    Full,

    /// The path would not fit even into an empty scratch buffer.
    #[error("path of {len} bytes exceeds the string area")]
    PathTooLong { len: usize },
}

/// Errors raised while running a build reaction.
#[derive(Error, Debug)]
pub enum ReactionError {
    #[error("failed to create capture pipe: {0}")]
    CaptureChannel(#[source] io::Error),

    #[error("failed to spawn build command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for build command: {0}")]
    Wait(#[source] io::Error),
}
