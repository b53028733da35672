/// IPC channel between the worker and the controller.
///
/// A plain unidirectional pipe. The worker owns the write end (as its
/// stdout) and writes finished event buffers with blocking writes. The
/// controller owns the non-blocking read end and reassembles buffers from
/// whatever chunks the kernel hands back, using the length field in each
/// buffer's header as the frame boundary.
use crate::error::{ProtocolError, WatcherError};
use crate::watcher::protocol::{self, WatcherEvent};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, OwnedFd};
use tracing::{error, warn};

/// Bytes requested from the pipe per read call.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Create a close-on-exec pipe and return `(receiver, write_end)`.
///
/// The read end is already switched to non-blocking mode. The write end is
/// returned raw so it can be installed as a child's stdout.
pub fn pipe() -> Result<(EventReceiver, OwnedFd), WatcherError> {
    let (read_end, write_end) =
        nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(WatcherError::Channel)?;
    set_nonblocking(&read_end).map_err(WatcherError::Channel)?;
    Ok((EventReceiver::new(File::from(read_end)), write_end))
}

fn set_nonblocking(fd: impl AsFd) -> nix::Result<()> {
    let fd = fd.as_fd();
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Write side of the channel, owned by the worker.
pub struct EventSender {
    out: File,
}

impl EventSender {
    pub fn new(fd: OwnedFd) -> Self {
        Self { out: File::from(fd) }
    }

    /// Write one finished event buffer. Blocks while the pipe is full.
    ///
    /// A failure here means the controller is gone.
    pub fn write_event(&mut self, buffer: &[u8]) -> Result<(), WatcherError> {
        self.out.write_all(buffer).map_err(WatcherError::Send)
    }
}

/// Read side of the channel, owned by the controller.
pub struct EventReceiver {
    input: File,
    /// Bytes received but not yet consumed as a complete event buffer.
    pending: Vec<u8>,
    chunk: Box<[u8]>,
    closed: bool,
}

enum Fill {
    /// New bytes were appended to `pending`.
    Data,
    /// Nothing available right now.
    Empty,
    /// EOF or a fatal read error; `closed` is set.
    Closed,
}

impl EventReceiver {
    fn new(input: File) -> Self {
        Self {
            input,
            pending: Vec::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            closed: false,
        }
    }

    /// `true` once the channel hit EOF or an unrecoverable error.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Return the next decoded event, or `None` if nothing complete is
    /// pending. Never blocks.
    ///
    /// A malformed event buffer is logged and skipped. Once the channel is
    /// closed every call returns `None` without touching the pipe.
    pub fn poll(&mut self) -> Option<WatcherEvent> {
        loop {
            if self.closed {
                return None;
            }

            match self.take_frame() {
                Ok(Some(frame)) => match protocol::decode(&frame) {
                    Ok(event) => return Some(event),
                    Err(e) => {
                        warn!("Watcher: dropping malformed event ({} bytes): {}", frame.len(), e);
                        continue;
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    error!("Watcher: event stream is corrupt, closing channel: {}", e);
                    self.closed = true;
                    return None;
                }
            }

            match self.fill() {
                Fill::Data => continue,
                Fill::Empty | Fill::Closed => return None,
            }
        }
    }

    /// Split one complete event buffer off the front of `pending`.
    fn take_frame(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let len = match protocol::frame_len(&self.pending)? {
            Some(len) => len,
            None => return Ok(None),
        };
        if self.pending.len() < len {
            return Ok(None);
        }
        Ok(Some(self.pending.drain(..len).collect()))
    }

    fn fill(&mut self) -> Fill {
        loop {
            match self.input.read(&mut self.chunk) {
                Ok(0) => {
                    if !self.pending.is_empty() {
                        warn!(
                            "Watcher: channel closed with {} bytes of an incomplete event",
                            self.pending.len()
                        );
                        self.pending.clear();
                    }
                    self.closed = true;
                    return Fill::Closed;
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&self.chunk[..n]);
                    return Fill::Data;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Fill::Empty,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Watcher: channel read failed: {}", e);
                    self.closed = true;
                    return Fill::Closed;
                }
            }
        }
    }
}
