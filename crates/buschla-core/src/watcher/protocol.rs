/// Wire protocol for event buffers sent from the worker to the controller.
///
/// Every buffer starts with a common header followed by a kind-specific
/// body. All integers are little-endian. Strings are never stored inline in
/// the header: the header stores a byte offset from the start of the buffer
/// and the string itself is NUL-terminated further down. The controller
/// relocates those offsets into owned values in [`decode`].
///
/// ```text
/// FileChanged     | kind u32 | len u32 | count u32 | offset u32 * count | paths\0... |
/// ReactionReport  | kind u32 | len u32 | exit i32  | msg_offset u32     | output\0   |
/// ```
use crate::error::ProtocolError;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

/// Size of the string area of one event buffer.
pub const STRING_AREA_SIZE: usize = 128 * 1024;

/// Size of the header shared by every event kind (`kind` + `len`).
pub const COMMON_HEADER_SIZE: usize = 8;

/// Header size of a FileChanged buffer, up to the first offset entry.
pub const FILE_CHANGED_HEADER_SIZE: usize = COMMON_HEADER_SIZE + 4;

/// Header size of a ReactionReport buffer, up to the output string.
pub const REACTION_REPORT_HEADER_SIZE: usize = COMMON_HEADER_SIZE + 8;

/// Size of one entry in the FileChanged offset table.
pub const OFFSET_SIZE: usize = 4;

/// Largest number of captured output bytes a report can carry.
pub const MAX_CAPTURE: usize = STRING_AREA_SIZE - 1;

/// Upper bound on the declared length of any event buffer.
pub const MAX_EVENT_SIZE: usize = REACTION_REPORT_HEADER_SIZE + STRING_AREA_SIZE;

/// Tag stored in the first four bytes of every event buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventKind {
    FileChanged = 0x100,
    ReactionReport = 0x200,
}

impl EventKind {
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0x100 => Some(Self::FileChanged),
            0x200 => Some(Self::ReactionReport),
            _ => None,
        }
    }
}

/// A decoded watcher event.
///
/// All data is owned, so callers may keep events for as long as they like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherEvent {
    /// One or more files were closed after writing, in OS delivery order.
    FileChanged { paths: Vec<PathBuf> },
    /// A build reaction finished.
    ReactionReport { exit_status: i32, output: String },
}

impl WatcherEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::FileChanged { .. } => EventKind::FileChanged,
            Self::ReactionReport { .. } => EventKind::ReactionReport,
        }
    }
}

pub(crate) fn write_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

/// Write the common header into the first [`COMMON_HEADER_SIZE`] bytes.
pub(crate) fn write_header(buf: &mut [u8], kind: EventKind, len: usize) {
    write_u32(buf, 0, kind.tag());
    write_u32(buf, 4, len as u32);
}

/// Encode a ReactionReport buffer.
///
/// Output beyond [`MAX_CAPTURE`] bytes is cut off. Interior NUL bytes are
/// dropped so the terminator is the only one in the string.
pub fn encode_reaction_report(exit_status: i32, output: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; REACTION_REPORT_HEADER_SIZE];
    buf.extend(output.iter().copied().filter(|&b| b != 0).take(MAX_CAPTURE));
    buf.push(0);

    let len = buf.len();
    write_header(&mut buf, EventKind::ReactionReport, len);
    buf[8..12].copy_from_slice(&exit_status.to_le_bytes());
    write_u32(&mut buf, 12, REACTION_REPORT_HEADER_SIZE as u32);
    buf
}

/// Inspect the start of a byte stream and return the length of the event
/// buffer at its head.
///
/// Returns `Ok(None)` while fewer than [`COMMON_HEADER_SIZE`] bytes are
/// available. A declared length outside `[COMMON_HEADER_SIZE, MAX_EVENT_SIZE]`
/// means the stream can no longer be framed.
pub fn frame_len(stream: &[u8]) -> Result<Option<usize>, ProtocolError> {
    if stream.len() < COMMON_HEADER_SIZE {
        return Ok(None);
    }
    let len = read_u32(stream, 4) as usize;
    if !(COMMON_HEADER_SIZE..=MAX_EVENT_SIZE).contains(&len) {
        return Err(ProtocolError::FrameLength(len));
    }
    Ok(Some(len))
}

/// Decode one complete event buffer, relocating every string offset into
/// an owned value.
pub fn decode(frame: &[u8]) -> Result<WatcherEvent, ProtocolError> {
    require(frame, COMMON_HEADER_SIZE)?;
    let declared = read_u32(frame, 4) as usize;
    if declared != frame.len() {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: frame.len(),
        });
    }

    let tag = read_u32(frame, 0);
    match EventKind::from_tag(tag) {
        Some(EventKind::FileChanged) => decode_file_changed(frame),
        Some(EventKind::ReactionReport) => decode_reaction_report(frame),
        None => Err(ProtocolError::UnknownKind(tag)),
    }
}

fn decode_file_changed(frame: &[u8]) -> Result<WatcherEvent, ProtocolError> {
    require(frame, FILE_CHANGED_HEADER_SIZE)?;
    let count = read_u32(frame, 8) as usize;
    let table_end = count
        .checked_mul(OFFSET_SIZE)
        .and_then(|n| n.checked_add(FILE_CHANGED_HEADER_SIZE))
        .ok_or(ProtocolError::Truncated {
            len: frame.len(),
            need: usize::MAX,
        })?;
    require(frame, table_end)?;

    let paths = (0..count)
        .map(|i| {
            let offset = read_u32(frame, FILE_CHANGED_HEADER_SIZE + i * OFFSET_SIZE) as usize;
            let bytes = relocate(frame, offset, table_end)?;
            Ok(PathBuf::from(OsStr::from_bytes(bytes)))
        })
        .collect::<Result<Vec<_>, ProtocolError>>()?;

    Ok(WatcherEvent::FileChanged { paths })
}

fn decode_reaction_report(frame: &[u8]) -> Result<WatcherEvent, ProtocolError> {
    require(frame, REACTION_REPORT_HEADER_SIZE)?;
    let mut status = [0u8; 4];
    status.copy_from_slice(&frame[8..12]);
    let exit_status = i32::from_le_bytes(status);
    let offset = read_u32(frame, 12) as usize;
    let bytes = relocate(frame, offset, REACTION_REPORT_HEADER_SIZE)?;

    Ok(WatcherEvent::ReactionReport {
        exit_status,
        output: String::from_utf8_lossy(bytes).into_owned(),
    })
}

/// Resolve a relative string offset into a slice of `frame`, excluding the
/// terminator. Strings may never start inside the header or offset table.
fn relocate(frame: &[u8], offset: usize, data_start: usize) -> Result<&[u8], ProtocolError> {
    if offset < data_start || offset >= frame.len() {
        return Err(ProtocolError::OffsetOutOfRange {
            offset,
            len: frame.len(),
        });
    }
    let tail = &frame[offset..];
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(ProtocolError::Unterminated(offset))?;
    Ok(&tail[..end])
}

fn require(frame: &[u8], need: usize) -> Result<(), ProtocolError> {
    if frame.len() < need {
        return Err(ProtocolError::Truncated {
            len: frame.len(),
            need,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_tags() {
        assert_eq!(EventKind::FileChanged.tag(), 0x100);
        assert_eq!(EventKind::ReactionReport.tag(), 0x200);
        assert_eq!(EventKind::from_tag(0x200), Some(EventKind::ReactionReport));
        assert_eq!(EventKind::from_tag(0), None);
    }

    #[test]
    fn test_reaction_report_layout() {
        let buf = encode_reaction_report(-2, b"build ok");
        assert_eq!(&buf[0..4], &0x200u32.to_le_bytes());
        assert_eq!(&buf[4..8], &(buf.len() as u32).to_le_bytes());
        assert_eq!(&buf[8..12], &(-2i32).to_le_bytes());
        assert_eq!(&buf[12..16], &16u32.to_le_bytes());
        assert_eq!(&buf[16..], b"build ok\0");

        assert_eq!(
            decode(&buf).unwrap(),
            WatcherEvent::ReactionReport {
                exit_status: -2,
                output: "build ok".into(),
            }
        );
    }

    #[test]
    fn test_reaction_report_truncates_to_capture_limit() {
        let output = vec![b'x'; MAX_CAPTURE + 100];
        let buf = encode_reaction_report(0, &output);
        assert_eq!(buf.len(), MAX_EVENT_SIZE);
        match decode(&buf).unwrap() {
            WatcherEvent::ReactionReport { output, .. } => assert_eq!(output.len(), MAX_CAPTURE),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_reaction_report_drops_interior_nul() {
        let buf = encode_reaction_report(1, b"a\0b\nc");
        match decode(&buf).unwrap() {
            WatcherEvent::ReactionReport { output, .. } => assert_eq!(output, "ab\nc"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_frame_len_needs_header() {
        assert_eq!(frame_len(&[0, 1, 0]), Ok(None));
        let buf = encode_reaction_report(0, b"ok");
        assert_eq!(frame_len(&buf[..8]), Ok(Some(buf.len())));
    }

    #[test]
    fn test_frame_len_rejects_absurd_lengths() {
        let mut header = [0u8; 8];
        write_header(&mut header, EventKind::FileChanged, 3);
        assert_eq!(frame_len(&header), Err(ProtocolError::FrameLength(3)));
        write_header(&mut header, EventKind::FileChanged, MAX_EVENT_SIZE + 1);
        assert_eq!(
            frame_len(&header),
            Err(ProtocolError::FrameLength(MAX_EVENT_SIZE + 1))
        );
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let mut buf = encode_reaction_report(0, b"ok");
        write_u32(&mut buf, 0, 0x300);
        assert_eq!(decode(&buf), Err(ProtocolError::UnknownKind(0x300)));
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let buf = encode_reaction_report(0, b"ok");
        assert!(matches!(
            decode(&buf[..buf.len() - 1]),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_offset_outside_buffer() {
        let mut buf = encode_reaction_report(0, b"ok");
        let len = buf.len();
        write_u32(&mut buf, 12, len as u32 + 10);
        assert_eq!(
            decode(&buf),
            Err(ProtocolError::OffsetOutOfRange {
                offset: len + 10,
                len,
            })
        );
    }

    #[test]
    fn test_decode_rejects_offset_into_header() {
        let mut buf = encode_reaction_report(0, b"ok");
        write_u32(&mut buf, 12, 4);
        assert!(matches!(
            decode(&buf),
            Err(ProtocolError::OffsetOutOfRange { offset: 4, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unterminated_string() {
        let mut buf = encode_reaction_report(0, b"ok");
        let last = buf.len() - 1;
        buf[last] = b'!';
        assert_eq!(decode(&buf), Err(ProtocolError::Unterminated(16)));
    }

    #[test]
    fn test_decode_rejects_oversized_offset_table() {
        let mut buf = vec![0u8; FILE_CHANGED_HEADER_SIZE + 4];
        let len = buf.len();
        write_header(&mut buf, EventKind::FileChanged, len);
        write_u32(&mut buf, 8, 1_000);
        assert!(matches!(decode(&buf), Err(ProtocolError::Truncated { .. })));
    }
}
