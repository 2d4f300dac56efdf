//! Traits for reading.
use crate::{Error, Offset, msg2err};

/// Read from a certain offset into a buffer.
pub trait Read {
    /// Read into some byte buffer. Returning zero means EOF.
    fn read_bytes(&self, offset: Offset, buf: &mut [u8]) -> Result<usize, Error>;
}

/// Extension methods to make implementations easier.
pub trait ReadExt {
    /// Fill the buffer.
    fn read_exact(&self, offset: Offset, buf: &mut [u8]) -> Result<(), Error>;

    /// Read as much as possible into the buffer.
    ///
    /// Stops early only at EOF and returns the number of bytes read.
    fn read_full(&self, offset: Offset, buf: &mut [u8]) -> Result<usize, Error>;
}

impl ReadExt for &dyn Read {
    fn read_exact(&self, offset: Offset, buf: &mut [u8]) -> Result<(), Error> {
        match self.read_full(offset, buf)? {
            n if n == buf.len() => Ok(()),
            _ => Err(msg2err!(PartialReadError)),
        }
    }

    fn read_full(&self, offset: Offset, buf: &mut [u8]) -> Result<usize, Error> {
        let mut n = 0;
        while n != buf.len() {
            match self.read_bytes(offset + n as Offset, &mut buf[n..])? {
                0 => break,
                c => n += c,
            }
        }
        Ok(n)
    }
}

/// An exact read could only be partially done.
#[derive(Debug)]
pub struct PartialReadError;

impl core::fmt::Display for PartialReadError {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        write!(fmt, "{:?}", self)
    }
}

/// A read was requested beyond the end of the storage.
///
/// Readers never clamp such a request; the caller has to validate the range first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRangeRead {
    pub offset: Offset,
    pub len: usize,
    pub size: Offset,
}

impl core::fmt::Display for OutOfRangeRead {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        write!(
            fmt,
            "read of {} bytes at offset {:#x} exceeds the size {:#x}",
            self.len, self.offset, self.size
        )
    }
}
