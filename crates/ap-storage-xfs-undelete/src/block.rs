//! Bounds-checked access to the disk.

use ap_storage::{Error, Offset, OutOfRangeRead, Read, ReadExt};

/// Reads whole ranges at absolute offsets.
///
/// A range crossing the end of the disk is refused with [`OutOfRangeRead`] and never
/// truncated.  Callers use [`BlockReader::available`] to stay inside.
#[derive(Clone, Copy)]
pub struct BlockReader<'a> {
    disk: &'a dyn Read,
    size: Offset,
}

impl<'a> BlockReader<'a> {
    pub fn new(disk: &'a dyn Read, size: Offset) -> Self {
        Self { disk, size }
    }

    /// The size of the disk in bytes.
    pub fn size(&self) -> Offset {
        self.size
    }

    /// The bytes that can be read at the offset.
    pub fn available(&self, offset: Offset) -> Offset {
        self.size.saturating_sub(offset)
    }

    /// Is the range inside the disk?
    pub fn check(&self, offset: Offset, len: usize) -> Result<(), Error> {
        match offset.checked_add(len as Offset) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::msg(OutOfRangeRead {
                offset,
                len,
                size: self.size,
            })),
        }
    }

    /// Fill the buffer from the offset.
    pub fn read_into(&self, offset: Offset, buf: &mut [u8]) -> Result<(), Error> {
        self.check(offset, buf.len())?;
        self.disk.read_exact(offset, buf)
    }

    /// Read `len` bytes at the offset.
    pub fn read_at(&self, offset: Offset, len: usize) -> Result<Vec<u8>, Error> {
        self.check(offset, len)?;
        let mut buf = vec![0u8; len];
        self.disk.read_exact(offset, &mut buf)?;
        Ok(buf)
    }
}
