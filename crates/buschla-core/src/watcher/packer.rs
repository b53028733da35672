/// Relative-addressed packing of changed paths into a FileChanged buffer.
///
/// The packer owns one fixed-size scratch region for its whole lifetime.
/// While collecting a batch the offset table grows up from the header and
/// the NUL-terminated path bytes grow down from the end of the region, so
/// no per-path allocation happens. [`PathPacker::finish`] then closes the
/// gap between the two, rewrites every offset for the final layout, and
/// copies out exactly the used bytes.
///
/// ```text
/// collecting:  | hdr | o0 o1 o2 -> ......free...... <- p2\0 p1\0 p0\0 |
/// finished:    | hdr | o0 o1 o2 | p2\0 p1\0 p0\0 |
/// ```
use crate::error::PackError;
use crate::watcher::protocol::{
    read_u32, write_header, write_u32, EventKind, FILE_CHANGED_HEADER_SIZE, OFFSET_SIZE,
    STRING_AREA_SIZE,
};

/// Scratch buffer for building one FileChanged event buffer at a time.
pub struct PathPacker {
    scratch: Box<[u8]>,
    count: usize,
    /// Start of the packed path bytes. Equals `scratch.len()` when empty.
    top: usize,
}

impl Default for PathPacker {
    fn default() -> Self {
        Self::new()
    }
}

impl PathPacker {
    /// Create a packer with the standard [`STRING_AREA_SIZE`] string area.
    pub fn new() -> Self {
        Self::with_string_area(STRING_AREA_SIZE)
    }

    /// Create a packer with a custom string area size.
    pub fn with_string_area(size: usize) -> Self {
        let scratch = vec![0u8; FILE_CHANGED_HEADER_SIZE + size].into_boxed_slice();
        let top = scratch.len();
        Self {
            scratch,
            count: 0,
            top,
        }
    }

    /// Number of paths packed since the last `finish`.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn table_end(&self) -> usize {
        FILE_CHANGED_HEADER_SIZE + self.count * OFFSET_SIZE
    }

    /// Append one path.
    ///
    /// Fails with [`PackError::Full`] when the entry no longer fits between
    /// the offset table and the packed strings; the packer is left unchanged
    /// so the caller can `finish` and retry. Fails with
    /// [`PackError::PathTooLong`] when not even an empty packer could hold it.
    pub fn push(&mut self, path: &[u8]) -> Result<(), PackError> {
        let needed = path.len() + 1;
        let area = self.scratch.len() - FILE_CHANGED_HEADER_SIZE;
        if needed + OFFSET_SIZE > area {
            return Err(PackError::PathTooLong { len: path.len() });
        }

        let table_end = self.table_end();
        if self.top < needed || self.top - needed < table_end + OFFSET_SIZE {
            return Err(PackError::Full);
        }

        self.top -= needed;
        let start = self.top;
        self.scratch[start..start + path.len()].copy_from_slice(path);
        self.scratch[start + path.len()] = 0;

        write_u32(&mut self.scratch, table_end, start as u32);
        self.count += 1;
        Ok(())
    }

    /// Compact the scratch region into a finished event buffer.
    ///
    /// Returns `None` when nothing was packed, so empty batches are never
    /// sent. The packer is reset and ready for the next batch either way.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.count == 0 {
            return None;
        }

        let table_end = self.table_end();
        let strings_len = self.scratch.len() - self.top;
        self.scratch.copy_within(self.top.., table_end);

        // Offsets were recorded against the scratch end; shift them down by
        // the size of the collapsed gap.
        let shift = self.top - table_end;
        for i in 0..self.count {
            let at = FILE_CHANGED_HEADER_SIZE + i * OFFSET_SIZE;
            let old = read_u32(&self.scratch, at) as usize;
            write_u32(&mut self.scratch, at, (old - shift) as u32);
        }

        let total = table_end + strings_len;
        write_header(&mut self.scratch, EventKind::FileChanged, total);
        write_u32(&mut self.scratch, 8, self.count as u32);

        let buffer = self.scratch[..total].to_vec();
        self.reset();
        Some(buffer)
    }

    fn reset(&mut self) {
        self.count = 0;
        self.top = self.scratch.len();
    }
}
